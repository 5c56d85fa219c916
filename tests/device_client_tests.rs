// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use homewizard_recorder::{DeviceClient, FieldValue, RecorderError};
use mockito::Server;
use serde_json::json;
use std::time::Duration;

fn client() -> DeviceClient {
    DeviceClient::new(Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_fetch_metadata() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "product_name": "P1 Meter",
                "product_type": "HWE-P1",
                "serial": "3c39e7aabbcc",
                "firmware_version": "4.19",
                "api_version": "v1"
            }"#,
        )
        .create_async()
        .await;

    let metadata = client()
        .fetch_metadata(&server.host_with_port())
        .await
        .unwrap();

    assert_eq!(metadata.product_name, "P1 Meter");
    assert_eq!(metadata.product_type, "HWE-P1");
    assert_eq!(metadata.get("firmware_version"), Some(&json!("4.19")));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_fetch_metadata_with_numeric_firmware_version() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/")
        .with_status(200)
        .with_body(r#"{"product_name":"P1 Meter","product_type":"p1_meter","firmware_version":4.19}"#)
        .create_async()
        .await;

    let metadata = client()
        .fetch_metadata(&server.host_with_port())
        .await
        .unwrap();

    assert_eq!(metadata.product_name, "P1 Meter");
    assert_eq!(metadata.get("firmware_version"), Some(&json!(4.19)));
}

#[tokio::test]
async fn test_fetch_measurements() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v1/data")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "wifi_ssid": "home",
                "wifi_strength": 100,
                "total_power_import_t1_kwh": 10830.511,
                "active_power_w": -543,
                "any_power_fail_count": 4,
                "external": [{"unique_id": "abc", "type": "gas_meter", "value": 111.1}]
            }"#,
        )
        .create_async()
        .await;

    let measurement = client()
        .fetch_measurements(&server.host_with_port())
        .await
        .unwrap();

    assert_eq!(measurement.len(), 6);
    let fields: Vec<_> = measurement.fields().map(|(k, _)| k.to_string()).collect();
    assert_eq!(
        fields,
        vec![
            "wifi_ssid",
            "wifi_strength",
            "total_power_import_t1_kwh",
            "active_power_w",
            "any_power_fail_count"
        ]
    );
    assert!(measurement
        .fields()
        .any(|(k, v)| k == "active_power_w" && v == FieldValue::Float(-543.0)));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_error_status_is_unreachable() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/v1/data")
        .with_status(503)
        .create_async()
        .await;
    let device = server.host_with_port();

    let err = client().fetch_measurements(&device).await.unwrap_err();
    match &err {
        RecorderError::DeviceUnreachable { device: d, source } => {
            assert_eq!(d, &device);
            assert_eq!(source.status().map(|s| s.as_u16()), Some(503));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.device(), Some(device.as_str()));
}

#[tokio::test]
async fn test_invalid_body_is_invalid_response() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/")
        .with_status(200)
        .with_body("<html>not json</html>")
        .create_async()
        .await;

    let err = client()
        .fetch_metadata(&server.host_with_port())
        .await
        .unwrap_err();
    match &err {
        RecorderError::InvalidResponse { source, .. } => assert!(source.is_decode()),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_connection_refused_is_connectivity_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let device = listener.local_addr().unwrap().to_string();
    drop(listener);

    let err = client().fetch_measurements(&device).await.unwrap_err();
    match &err {
        RecorderError::DeviceUnreachable { source, .. } => assert!(source.is_connect()),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.to_string().contains(&device));
}
