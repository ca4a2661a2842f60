//! Producer-side integration tests against the in-process KV store.

mod common;

use common::{gunzip, service_file};
use mockconsul::MockConsul;
use prost::Message;
use protogate_core::kv::Client;
use protogate_core::pb;
use protogate_core::registrator::Registrator;
use protogate_core::Error;
use sha1::{Digest, Sha1};
use tokio_util::sync::CancellationToken;

const DATA_KEY: &str = "gapi/data/user/usr.proto";
const CHECKSUM_KEY: &str = "gapi/checksum/user/usr.proto";
const NOTIFY_KEY: &str = "gapi/notify";

fn registrator(consul: &MockConsul) -> Registrator {
    Registrator::new(Client::new(consul.addr(), ""), "gapi")
}

#[tokio::test(flavor = "multi_thread")]
async fn published_bytes_roundtrip() {
    let consul = MockConsul::start().await;
    let cancel = CancellationToken::new();
    let file = service_file("usr", "user", "/u/{id}");

    registrator(&consul)
        .register_files(&cancel, "user", std::slice::from_ref(&file))
        .await
        .unwrap();

    let stored = consul.value(DATA_KEY).expect("data key written");
    let decoded = pb::FileDescriptorProto::decode(gunzip(&stored).as_slice()).unwrap();
    assert_eq!(decoded, file);

    // The checksum key holds the hex sha1 of the gzipped bytes.
    let chksum = consul.value(CHECKSUM_KEY).expect("checksum key written");
    assert_eq!(
        String::from_utf8(chksum).unwrap(),
        hex::encode(Sha1::digest(&stored))
    );

    assert!(consul.modify_index(NOTIFY_KEY).is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn republishing_identical_content_writes_nothing() {
    let consul = MockConsul::start().await;
    let cancel = CancellationToken::new();
    let file = service_file("usr", "user", "/u/{id}");
    let reg = registrator(&consul);

    reg.register_files(&cancel, "user", std::slice::from_ref(&file))
        .await
        .unwrap();
    let data_index = consul.modify_index(DATA_KEY).unwrap();
    let chksum_index = consul.modify_index(CHECKSUM_KEY).unwrap();
    let notify_index = consul.modify_index(NOTIFY_KEY).unwrap();

    reg.register_files(&cancel, "user", std::slice::from_ref(&file))
        .await
        .unwrap();
    assert_eq!(consul.modify_index(DATA_KEY).unwrap(), data_index);
    assert_eq!(consul.modify_index(CHECKSUM_KEY).unwrap(), chksum_index);
    // The notify key is bumped once per call regardless.
    assert!(consul.modify_index(NOTIFY_KEY).unwrap() > notify_index);
}

#[tokio::test(flavor = "multi_thread")]
async fn changed_content_is_republished() {
    let consul = MockConsul::start().await;
    let cancel = CancellationToken::new();
    let reg = registrator(&consul);

    let v1 = service_file("usr", "user", "/u/{id}");
    reg.register_files(&cancel, "user", std::slice::from_ref(&v1))
        .await
        .unwrap();
    let first = consul.modify_index(DATA_KEY).unwrap();

    let v2 = service_file("usr", "user", "/users/{id}");
    reg.register_files(&cancel, "user", std::slice::from_ref(&v2))
        .await
        .unwrap();
    assert!(consul.modify_index(DATA_KEY).unwrap() > first);

    let stored = consul.value(DATA_KEY).unwrap();
    let decoded = pb::FileDescriptorProto::decode(gunzip(&stored).as_slice()).unwrap();
    assert_eq!(decoded, v2);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_producers_converge_with_one_write() {
    let consul = MockConsul::start().await;
    let cancel = CancellationToken::new();
    let file = service_file("usr", "user", "/u/{id}");

    let a = registrator(&consul);
    let b = registrator(&consul);
    let (ra, rb) = tokio::join!(
        a.register_files(&cancel, "user", std::slice::from_ref(&file)),
        b.register_files(&cancel, "user", std::slice::from_ref(&file)),
    );
    ra.unwrap();
    rb.unwrap();

    // Exactly one transaction landed on the data key.
    assert_eq!(
        consul.create_index(DATA_KEY).unwrap(),
        consul.modify_index(DATA_KEY).unwrap()
    );

    let stored = consul.value(DATA_KEY).unwrap();
    let chksum = consul.value(CHECKSUM_KEY).unwrap();
    assert_eq!(
        String::from_utf8(chksum).unwrap(),
        hex::encode(Sha1::digest(&stored))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_propagates() {
    let consul = MockConsul::start().await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let file = service_file("usr", "user", "/u/{id}");
    let err = registrator(&consul)
        .register_files(&cancel, "user", std::slice::from_ref(&file))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(consul.keys().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_file_set_is_a_no_op() {
    let consul = MockConsul::start().await;
    let cancel = CancellationToken::new();

    registrator(&consul)
        .register_files(&cancel, "user", &[])
        .await
        .unwrap();
    // No data, and no notify bump either.
    assert!(consul.keys().is_empty());
}
