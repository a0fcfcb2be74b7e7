// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

#![cfg(target_os = "linux")]

use shmwire::queue::page_size;
use shmwire::{
    Decoder, Encoder, GrantorDescriptor, HandleResource, InProcessTransport, MemfdAllocator,
    QueueDescriptor, QueueFlavor, WireError,
};

#[test]
fn test_create_synchronized_queue() {
    let descriptor = QueueDescriptor::create(4096, 8, QueueFlavor::Synchronized).unwrap();

    assert_eq!(descriptor.quantum(), 8);
    assert_eq!(descriptor.size(), 4096);
    assert_eq!(descriptor.count_grantors(), 3);
    assert_eq!(descriptor.flags(), 0x01);
    assert!(descriptor.is_handle_valid());
}

#[test]
fn test_map_region_applies_page_offset() {
    let descriptor = QueueDescriptor::create(4096, 8, QueueFlavor::Synchronized).unwrap();

    let data = descriptor.map_region(QueueDescriptor::DATA_PTR_POS).unwrap();
    assert_eq!(data.len(), 4096);
    assert_eq!(data.mapping_file_offset(), 0);
    assert_eq!(data.page_offset(), 16);
    assert_eq!(data.mapped_len(), 16 + 4096);

    let write_ptr = descriptor.map_region(QueueDescriptor::WRITE_PTR_POS).unwrap();
    assert_eq!(write_ptr.page_offset(), 8);
    write_ptr.write_at(0, &42u64.to_le_bytes()).unwrap();
    data.write_at(0, b"payload").unwrap();

    // The same bytes are visible through an independent mapping of the fd.
    let whole = descriptor.map_region(QueueDescriptor::READ_PTR_POS).unwrap();
    assert_eq!(whole.page_offset(), 0);
    let mut counter = [0u8; 8];
    write_ptr.read_at(0, &mut counter).unwrap();
    assert_eq!(u64::from_le_bytes(counter), 42);

    assert!(matches!(
        data.write_at(4090, &[0u8; 8]),
        Err(WireError::MapFailed { grantor: 2, .. })
    ));
    descriptor.unmap_region(data);
}

#[test]
fn test_grantor_past_first_page() {
    let page = page_size() as u32;
    let memory = MemfdAllocator::new().allocate(u64::from(page) * 2).unwrap();
    let grantors = vec![
        GrantorDescriptor::new(0, 0, 8),
        GrantorDescriptor::new(0, 8, 8),
        GrantorDescriptor::new(0, page + 24, 64),
    ];
    let descriptor = QueueDescriptor::new(
        grantors,
        memory.into_handle(),
        4,
        QueueFlavor::UnsynchronizedWrite,
    )
    .unwrap();

    let data = descriptor.map_region(QueueDescriptor::DATA_PTR_POS).unwrap();
    assert_eq!(data.mapping_file_offset(), u64::from(page));
    assert_eq!(data.page_offset(), 24);
    assert_eq!(data.len(), 64);
}

#[test]
fn test_copy_shares_memory() {
    let descriptor = QueueDescriptor::create(256, 4, QueueFlavor::UnsynchronizedWrite).unwrap();
    let copy = descriptor.try_clone().unwrap();
    assert_eq!(copy.grantors(), descriptor.grantors());
    assert_eq!(copy.flavor(), QueueFlavor::UnsynchronizedWrite);

    descriptor
        .map_region(QueueDescriptor::DATA_PTR_POS)
        .unwrap()
        .write_at(10, b"abc")
        .unwrap();
    drop(descriptor);

    let mut out = [0u8; 3];
    copy.map_region(QueueDescriptor::DATA_PTR_POS)
        .unwrap()
        .read_at(10, &mut out)
        .unwrap();
    assert_eq!(&out, b"abc");
}

#[test]
fn test_descriptor_round_trip_through_transport() {
    let descriptor = QueueDescriptor::create(4096, 8, QueueFlavor::Synchronized).unwrap();
    descriptor
        .map_region(QueueDescriptor::DATA_PTR_POS)
        .unwrap()
        .write_at(0, b"sent")
        .unwrap();

    let mut transport = InProcessTransport::new(4096);
    let mut enc = Encoder::new(&mut transport).unwrap();
    enc.write_root(&descriptor).unwrap();
    // Root, grantor list, handle.
    assert_eq!(enc.finish(), 3);
    assert_eq!(transport.fd_count(), 1);

    let mut dec = Decoder::new(&transport).unwrap();
    let received: QueueDescriptor = dec.read_root().unwrap();
    assert_eq!(received.quantum(), 8);
    assert_eq!(received.size(), 4096);
    assert_eq!(received.flavor(), QueueFlavor::Synchronized);
    assert_eq!(received.grantors(), descriptor.grantors());

    let mut out = [0u8; 4];
    received
        .map_region(QueueDescriptor::DATA_PTR_POS)
        .unwrap()
        .read_at(0, &mut out)
        .unwrap();
    assert_eq!(&out, b"sent");
}

#[test]
fn test_decoding_descriptor_without_handle_is_corrupt() {
    let descriptor = QueueDescriptor::with_capacity(
        64,
        4,
        HandleResource::empty(),
        QueueFlavor::Synchronized,
    )
    .unwrap();

    let mut transport = InProcessTransport::new(4096);
    let mut enc = Encoder::new(&mut transport).unwrap();
    enc.write_root(&descriptor).unwrap();
    enc.finish();

    let mut dec = Decoder::new(&transport).unwrap();
    assert!(matches!(
        dec.read_root::<QueueDescriptor>(),
        Err(WireError::CorruptTransport(_))
    ));
}
