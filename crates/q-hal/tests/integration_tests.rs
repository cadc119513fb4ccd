// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Integration tests for q-hal

mod rng_tests {
    use q_hal::{RngInterface, SoftwareRng};
    use std::collections::HashSet;

    #[test]
    fn test_different_seeds_diverge() {
        let mut a = SoftwareRng::new(0x0011_2233_4455_6677);
        let mut b = SoftwareRng::new(0x0011_2233_4455_6678);
        assert_ne!(a.next_u32().unwrap(), b.next_u32().unwrap());
    }

    #[test]
    fn test_fill_odd_length() {
        let mut rng = SoftwareRng::new(99);
        let mut buf = [0u8; 7];
        rng.fill_bytes(&mut buf).unwrap();
        assert!(buf.iter().any(|&b| b != 0));
    }

    #[test]
    fn test_short_sequence_has_no_repeats() {
        let mut rng = SoftwareRng::new(1234);
        let values: HashSet<u32> = (0..256).map(|_| rng.next_u32().unwrap()).collect();
        assert_eq!(values.len(), 256);
    }
}

mod error_tests {
    use q_hal::HalError;

    #[test]
    fn test_hal_error_converts() {
        let e: q_common::Error = HalError::Busy.into();
        assert_eq!(e, q_common::Error::Busy);
        assert_eq!(format!("{}", HalError::RngError), "[0x0820] RNG error");
    }
}
