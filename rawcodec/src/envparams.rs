// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use log::warn;

pub(crate) fn rawcodec_max_strip_failures() -> Option<usize> {
  match std::env::var("RAWCODEC_MAX_STRIP_FAILURES").map(|val| val.parse::<usize>()) {
    Ok(Ok(value)) => Some(value),
    Ok(Err(_)) => {
      warn!("Invalid value for RAWCODEC_MAX_STRIP_FAILURES");
      None
    }
    Err(_) => None,
  }
}

pub(crate) fn rawcodec_ignore_corrections() -> bool {
  match std::env::var("RAWCODEC_IGNORE_CORRECTIONS").map(|val| val.parse::<u32>()) {
    Ok(Ok(value)) => value == 1,
    Ok(Err(_)) => {
      warn!("Invalid value for RAWCODEC_IGNORE_CORRECTIONS");
      false
    }
    Err(_) => false,
  }
}
