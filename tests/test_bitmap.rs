// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_psys::bitmap::{KernelBitmap, ResourceBitmap, RoutingBitmap, TerminalBitmap};
use std::error::Error;

#[test]
fn test_widths() -> Result<(), Box<dyn Error>> {
    assert_eq!(KernelBitmap::BITS, 128);
    assert_eq!(RoutingBitmap::BITS, 160);
    assert_eq!(ResourceBitmap::BITS, 32);
    assert_eq!(TerminalBitmap::BITS, 256);
    Ok(())
}

#[test]
fn test_set_operations() -> Result<(), Box<dyn Error>> {
    let a = KernelBitmap::from_indices([0, 31, 32, 127]);
    let b = KernelBitmap::from_indices([31, 64]);
    println!("a={} b={}", a, b);

    assert_eq!(a.weight(), 4);
    assert_eq!(a.iter_ones().collect::<Vec<_>>(), vec![0, 31, 32, 127]);
    assert_eq!(a.union(b).weight(), 5);
    assert_eq!(a.intersection(b), KernelBitmap::bit_mask(31));
    assert!(a.intersects(&b));
    assert!(!a.is_subset(&b));
    assert!(a.intersection(b).is_subset(&a));
    assert!(a.is_superset(&KernelBitmap::from_indices([0, 127])));
    assert_eq!(a.lowest_set(), Some(0));
    assert_eq!(a.unset(0).lowest_set(), Some(31));
    assert_eq!(KernelBitmap::clear().lowest_set(), None);
    assert!(KernelBitmap::bit_mask(77).is_onehot());
    assert!(!a.is_onehot());
    assert!(a.is_equal(&a.set(32)));
    assert_eq!(a.complement().intersection(a), KernelBitmap::clear());

    Ok(())
}

#[test]
fn test_out_of_range_bits() -> Result<(), Box<dyn Error>> {
    assert!(KernelBitmap::bit_mask(128).is_empty());
    assert!(KernelBitmap::clear().set(500).is_empty());
    assert!(!KernelBitmap::from_indices([1]).is_set(1000));
    assert_eq!(KernelBitmap::from_indices([1, 128, 129]).weight(), 1);
    assert_eq!(ResourceBitmap::from_indices([31, 32]).weight(), 1);
    Ok(())
}

#[test]
fn test_set_unique() -> Result<(), Box<dyn Error>> {
    let owned = TerminalBitmap::clear().set_unique(3);
    assert!(owned.is_set(3));
    assert!(owned.set_unique(3).is_empty());
    assert_eq!(owned.set_unique(200).weight(), 2);
    Ok(())
}

#[test]
fn test_u64_marshalling() -> Result<(), Box<dyn Error>> {
    let value = 0x1234_5678_9abc_def0u64;
    let bv = KernelBitmap::from_u64(value);
    assert_eq!(bv.word(0), 0x9abc_def0);
    assert_eq!(bv.word(1), 0x1234_5678);
    assert_eq!(bv.word(2), 0);
    assert_eq!(bv.to_u64(), value);

    // Only the first 32 bits survive in a single word vector.
    assert_eq!(ResourceBitmap::from_u64(value).to_u64(), 0x9abc_def0);
    Ok(())
}

#[test]
fn test_extract_bits() -> Result<(), Box<dyn Error>> {
    let rbm = RoutingBitmap::from_indices([30, 31, 32, 33, 159]);

    assert_eq!(rbm.extract_bits(30, 4), 0b1111);
    // Field straddles the first word boundary.
    assert_eq!(rbm.extract_bits(28, 8), 0b0011_1100);
    assert_eq!(rbm.extract_bits(32, 32), 0b11);
    // Bits past the last word read as zero.
    assert_eq!(rbm.extract_bits(156, 8), 0b1000);
    assert_eq!(rbm.extract_bits(0, 0), 0);
    assert_eq!(rbm.extract_bits(0, 33), 0);
    Ok(())
}

#[test]
fn test_display_and_serde() -> Result<(), Box<dyn Error>> {
    let bv = KernelBitmap::from_indices([0, 36]);
    assert_eq!(
        bv.to_string(),
        "0x00000000000000000000001000000001"
    );

    let json = serde_json::to_string(&bv)?;
    assert_eq!(json, "[0,36]");
    let back: KernelBitmap = serde_json::from_str(&json)?;
    assert_eq!(back, bv);

    assert!(serde_json::from_str::<KernelBitmap>("[128]").is_err());
    Ok(())
}
