//! Fuzz target: `unpack_elements` / `read_param_elem`
//!
//! The first byte picks the element count; the rest is the element block.
//! Every decoded element must be readable as every type without panics,
//! and reads into a small buffer never exceed it.
//!
//! cargo fuzz run fuzz_unpack_elements

#![no_main]

use libfuzzer_sys::fuzz_target;
use wnc_driver::nc::elem::{ElemType, read_param_elem, unpack_elements};

const TYPES: [ElemType; 8] = [
    ElemType::Invalid,
    ElemType::Integer,
    ElemType::IntegerUnsigned,
    ElemType::IntegerFrac,
    ElemType::String,
    ElemType::ByteArray,
    ElemType::Bool,
    ElemType::MacAddr,
];

fuzz_target!(|data: &[u8]| {
    let Some((&count, raw)) = data.split_first() else {
        return;
    };
    let Some(elems) = unpack_elements(usize::from(count % 16), raw) else {
        return;
    };

    for elem in &elems {
        for ty in TYPES {
            let mut small = [0u8; 4];
            assert!(read_param_elem(Some(elem), ty, &mut small) <= small.len());
            let mut wide = [0u8; 64];
            let _ = read_param_elem(Some(elem), ty, &mut wide);
        }
        let _ = (elem.as_bool(), elem.as_i64(), elem.as_frac(), elem.as_bytes(), elem.as_mac());
    }
});
