//! IPv4 prefix mask helpers.
//!
//! Version 5 and 7 records carry prefix lengths as bit counts while
//! aggregated version 8 records and traffic records carry full dotted
//! masks. A valid mask is a contiguous run of high bits, so both forms
//! convert losslessly.

use crate::CorruptData;

/// Check that `mask` is a contiguous prefix mask. Zero is the absent mask
/// and passes.
///
/// # Errors
///
/// Returns [`CorruptData::Mask`] if set bits are not a single high run.
pub fn check(mask: u32) -> Result<(), CorruptData> {
    if mask.leading_ones() + mask.trailing_zeros() == 32 {
        Ok(())
    } else {
        Err(CorruptData::Mask { mask })
    }
}

/// Number of prefix bits in a full mask.
///
/// # Errors
///
/// Returns [`CorruptData::Mask`] if the mask is not a contiguous prefix.
#[allow(clippy::cast_possible_truncation)]
pub fn to_bits(mask: u32) -> Result<u8, CorruptData> {
    check(mask)?;
    Ok(mask.count_ones() as u8)
}

/// Expand a prefix bit count into a full mask.
///
/// # Errors
///
/// Returns [`CorruptData::MaskBits`] for counts past 32.
pub fn from_bits(bits: u8) -> Result<u32, CorruptData> {
    match bits {
        0 => Ok(0),
        1..=32 => Ok(u32::MAX << (32 - u32::from(bits))),
        _ => Err(CorruptData::MaskBits { bits }),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_masks() {
        assert!(check(0).is_ok());
        assert!(check(u32::MAX).is_ok());
        assert!(check(0xFFFF_FF00).is_ok());
        assert!(check(0x8000_0000).is_ok());
        assert!(check(0xFF00_FF00).is_err());
        assert!(check(0x0000_00FF).is_err());
        assert!(check(1).is_err());
    }

    #[test]
    fn known_bit_counts() {
        assert_eq!(from_bits(0).unwrap(), 0);
        assert_eq!(from_bits(8).unwrap(), 0xFF00_0000);
        assert_eq!(from_bits(24).unwrap(), 0xFFFF_FF00);
        assert_eq!(from_bits(32).unwrap(), u32::MAX);
        assert!(matches!(
            from_bits(33),
            Err(CorruptData::MaskBits { bits: 33 })
        ));

        assert_eq!(to_bits(0).unwrap(), 0);
        assert_eq!(to_bits(0xFFFF_FF00).unwrap(), 24);
        assert_eq!(to_bits(u32::MAX).unwrap(), 32);
        assert!(to_bits(0x00FF_0000).is_err());
    }

    proptest! {
        #[test]
        fn bits_round_trip(bits in 0u8..=32) {
            let mask = from_bits(bits).unwrap();
            prop_assert!(check(mask).is_ok());
            prop_assert_eq!(to_bits(mask).unwrap(), bits);
        }

        #[test]
        fn arbitrary_masks_either_check_or_fail_both_ways(mask in any::<u32>()) {
            match check(mask) {
                Ok(()) => {
                    let bits = to_bits(mask).unwrap();
                    prop_assert_eq!(from_bits(bits).unwrap(), mask);
                }
                Err(_) => prop_assert!(to_bits(mask).is_err()),
            }
        }
    }
}
