//! End-to-end gateway flows over the in-memory backend and the reference
//! identity provider.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};

use authkit::Gateway;
use authkit_core::{
    provider::IdentityProvider,
    storage::{MemoryBackend, StorageBackend, StorageRoot},
};

const HUB_URL: &str = "https://hub.example.com";

fn config() -> Value {
    json!({
        "appDomain": "https://app.example.com",
        "scopes": ["store_write", "publish_data"],
    })
}

fn sign_in(gateway: &Gateway, provider: &IdentityProvider) -> String {
    let result = gateway.sign_in().expect("sign in");
    let uri = result["authRequestUri"].as_str().expect("uri");
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_secs();
    let token = provider.respond(uri, now).expect("respond");
    let result = gateway.complete_sign_in(&token).expect("complete");
    result["decentralizedID"].as_str().expect("did").to_string()
}

#[tokio::test]
async fn full_session_and_file_flow() {
    let backend = Arc::new(MemoryBackend::new());
    let gateway = Gateway::new(Arc::clone(&backend) as Arc<dyn StorageBackend>);
    let provider = IdentityProvider::new(HUB_URL);

    assert_eq!(
        gateway.create_session(&config()).expect("create"),
        json!({ "loaded": true })
    );
    assert_eq!(
        gateway.is_user_signed_in().expect("query"),
        json!({ "signedIn": false })
    );

    let did = sign_in(&gateway, &provider);
    assert_eq!(did, provider.decentralized_id());
    assert_eq!(
        gateway.is_user_signed_in().expect("query"),
        json!({ "signedIn": true })
    );
    assert_eq!(
        gateway.load_user_data().expect("user data"),
        json!({ "decentralizedID": did })
    );

    // encrypted round trip through the caller surface
    let put = gateway
        .put_file("notes/hello.txt", "hello gateway", &json!({ "encrypt": true }))
        .await
        .expect("put");
    assert!(put["fileUrl"].as_str().expect("url").contains("notes/hello.txt"));

    let got = gateway
        .get_file("notes/hello.txt", &json!({ "decrypt": true }))
        .await
        .expect("get");
    assert_eq!(got, json!({ "fileContents": "hello gateway" }));

    // sign out clears credentials
    assert_eq!(
        gateway.sign_user_out().expect("sign out"),
        json!({ "signedOut": true })
    );
    assert_eq!(
        gateway.load_user_data().expect_err("must fail").code,
        "session_not_loaded"
    );
    assert_eq!(
        gateway.is_user_signed_in().expect("query"),
        json!({ "signedIn": false })
    );
}

#[tokio::test]
async fn sign_in_error_paths_surface_codes() {
    let gateway = Gateway::new(Arc::new(MemoryBackend::new()));
    let provider = IdentityProvider::new(HUB_URL);

    assert_eq!(gateway.sign_in().expect_err("no session").code, "session_not_loaded");

    gateway.create_session(&config()).expect("create");
    gateway.sign_in().expect("begin");
    assert_eq!(
        gateway.sign_in().expect_err("second begin").code,
        "sign_in_already_in_progress"
    );

    gateway.cancel_sign_in().expect("cancel");
    let result = gateway.sign_in().expect("begin again");
    let uri = result["authRequestUri"].as_str().expect("uri");

    let expired = provider
        .respond_at(uri, 1_600_000_000, 1_600_003_600)
        .expect("expired token");
    assert_eq!(
        gateway.complete_sign_in(&expired).expect_err("expired").code,
        "handshake_expired"
    );

    // the failed handshake reset the session, so completing again reports
    // that nothing is pending
    assert_eq!(
        gateway.complete_sign_in(&expired).expect_err("reset").code,
        "no_handshake_in_progress"
    );
}

#[tokio::test]
async fn get_file_distinguishes_text_from_binary() {
    let backend = Arc::new(MemoryBackend::new());
    let gateway = Gateway::new(Arc::clone(&backend) as Arc<dyn StorageBackend>);
    let provider = IdentityProvider::new(HUB_URL);

    gateway.create_session(&config()).expect("create");
    sign_in(&gateway, &provider);

    // plant an opaque object directly under the user's storage root
    let payload = vec![0u8, 1, 254, 255];
    let root = StorageRoot::new(HUB_URL, &provider.storage_address());
    backend
        .put_object(&root, "blob.bin", payload.clone(), "application/octet-stream")
        .await
        .expect("seed object");

    let got = gateway
        .get_file("blob.bin", &json!({ "decrypt": false }))
        .await
        .expect("get");
    assert_eq!(
        got,
        json!({ "fileContentsEncoded": STANDARD.encode(&payload) })
    );

    let missing = gateway
        .get_file("never-written.bin", &json!({ "decrypt": false }))
        .await
        .expect_err("must fail");
    assert_eq!(missing.code, "storage_read_error");
}

#[tokio::test]
async fn replacing_the_session_resets_sign_in_state() {
    let gateway = Gateway::new(Arc::new(MemoryBackend::new()));
    let provider = IdentityProvider::new(HUB_URL);

    gateway.create_session(&config()).expect("create");
    sign_in(&gateway, &provider);
    assert_eq!(
        gateway.is_user_signed_in().expect("query"),
        json!({ "signedIn": true })
    );

    gateway.create_session(&config()).expect("replace");
    assert_eq!(
        gateway.is_user_signed_in().expect("query"),
        json!({ "signedIn": false })
    );
    assert_eq!(
        gateway.load_user_data().expect_err("must fail").code,
        "session_not_loaded"
    );
}
