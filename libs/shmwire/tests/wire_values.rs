// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use shmwire::{
    Decoder, Encoder, ExceptionCode, InProcessTransport, InterfaceVersion, RegionHandle, Status,
    WireError, WireString,
};

#[test]
fn test_status_round_trip() {
    let status = Status::from_service_specific_error(17, "device busy").unwrap();

    let mut transport = InProcessTransport::new(4096);
    let mut enc = Encoder::new(&mut transport).unwrap();
    enc.write_root(&status).unwrap();
    enc.finish();

    let mut dec = Decoder::new(&transport).unwrap();
    let decoded: Status = dec.read_root().unwrap();
    assert_eq!(decoded, status);
    assert_eq!(decoded.exception_code(), ExceptionCode::ServiceSpecific);
    assert_eq!(decoded.to_string(), "Status(-8): '17: device busy'");
}

#[test]
fn test_ok_status_round_trip() {
    let mut transport = InProcessTransport::new(4096);
    let ok = Status::ok();
    let mut enc = Encoder::new(&mut transport).unwrap();
    enc.write_root(&ok).unwrap();
    enc.finish();

    let decoded: Status = Decoder::new(&transport).unwrap().read_root().unwrap();
    assert!(decoded.is_ok());
    assert_eq!(decoded.to_string(), "No error");
}

#[test]
fn test_transaction_failure_is_not_encodable() {
    let mut transport = InProcessTransport::new(4096);
    let failed = Status::from_transaction_error(-32);
    let mut enc = Encoder::new(&mut transport).unwrap();
    assert!(matches!(
        enc.write_root(&failed),
        Err(WireError::TransactionFailed(-32))
    ));
}

#[test]
fn test_version_wire_layout() {
    let mut transport = InProcessTransport::new(4096);
    let version = InterfaceVersion::new(1, 2);
    let mut enc = Encoder::new(&mut transport).unwrap();
    let root = enc.write_root(&version).unwrap();
    enc.finish();

    let mut dec = Decoder::new(&transport).unwrap();
    assert_eq!(dec.region_bytes(root).unwrap(), &0x0001_0002u32.to_le_bytes());
    assert_eq!(dec.read_root::<InterfaceVersion>().unwrap(), version);
}

#[test]
fn test_identical_strings_are_written_once() {
    let mut transport = InProcessTransport::new(4096);
    let text = "shared";
    let strings = shmwire::FixedBuffer::new([
        WireString::borrowed(text).unwrap(),
        WireString::borrowed(text).unwrap(),
        WireString::borrowed(&text[1..]).unwrap(),
    ]);

    let mut enc = Encoder::new(&mut transport).unwrap();
    enc.write_root(&strings).unwrap();
    // Strings only alias on an exact span; the suffix gets its own region.
    assert_eq!(enc.finish(), 3);

    let mut dec = Decoder::new(&transport).unwrap();
    assert!(dec.read_embedded(RegionHandle(0), 24).unwrap().is_reference());
    let decoded: shmwire::FixedBuffer<WireString<'static>, 3> = dec.read_root().unwrap();
    assert_eq!(decoded[0], "shared");
    assert_eq!(decoded[1], "shared");
    assert_eq!(decoded[2], "hared");
}

#[cfg(target_os = "linux")]
#[test]
fn test_shared_memory_round_trip() {
    use shmwire::{MemfdAllocator, SharedMemory};

    let memory = MemfdAllocator::new().allocate(8192).unwrap();
    memory.map().unwrap().write_at(4000, b"across").unwrap();

    let mut transport = InProcessTransport::new(4096);
    let mut enc = Encoder::new(&mut transport).unwrap();
    enc.write_root(&memory).unwrap();
    enc.finish();

    let mut dec = Decoder::new(&transport).unwrap();
    let received: SharedMemory = dec.read_root().unwrap();
    assert_eq!(received.name(), "memfd");
    assert_eq!(received.size(), 8192);

    let mut out = [0u8; 6];
    received.map().unwrap().read_at(4000, &mut out).unwrap();
    assert_eq!(&out, b"across");
}
