//! HTTP behaviour of the detector client against a mock service.

use std::time::Duration;

use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use vframe_ml_client::{DetectorClient, MlClientConfig, MlError, QueryService};
use vframe_models::{Detector, DetectorSpec, Label};
use wiremock::matchers::{body_bytes, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> DetectorClient {
    DetectorClient::new(MlClientConfig {
        endpoint: server.uri(),
        api_token: "test-token".to_string(),
        timeout: Duration::from_secs(5),
        max_retries: 1,
        ask_wait: Duration::from_secs(3),
    })
    .expect("client")
}

fn robot_detector() -> Detector {
    Detector {
        id: "det_robot".to_string(),
        name: "robot_detector".to_string(),
        query: "Is the robot upside down?".to_string(),
        confidence_threshold: 0.9,
    }
}

#[tokio::test]
async fn test_get_or_create_uses_existing_detector() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/detectors"))
        .and(query_param("name", "robot_detector"))
        .and(header("x-api-token", "test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{
                "id": "det_robot",
                "name": "robot_detector",
                "query": "Is the robot upside down?",
                "confidence_threshold": 0.75
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/detectors"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let detector = client_for(&server)
        .get_or_create_detector(&DetectorSpec::new("robot_detector", "Is the robot upside down?"))
        .await
        .unwrap();

    assert_eq!(detector.id, "det_robot");
    assert_eq!(detector.confidence_threshold, 0.75);
}

#[tokio::test]
async fn test_get_or_create_creates_missing_detector() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/detectors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/detectors"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "det_new",
            "name": "robot_detector",
            "query": "Is the robot upside down?",
            "confidence_threshold": 0.9
        })))
        .expect(1)
        .mount(&server)
        .await;

    let detector = client_for(&server)
        .get_or_create_detector(&DetectorSpec::new("robot_detector", "Is the robot upside down?"))
        .await
        .unwrap();

    assert_eq!(detector.id, "det_new");
}

#[tokio::test]
async fn test_ask_posts_image_bytes() {
    let server = MockServer::start().await;
    let image = vec![0xff, 0xd8, 0xff, 0xe0, 0x00];

    Mock::given(method("POST"))
        .and(path("/v1/image-queries"))
        .and(query_param("detector_id", "det_robot"))
        .and(query_param("wait", "3"))
        .and(header("content-type", "image/jpeg"))
        .and(body_bytes(image.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "iq_1",
            "detector_id": "det_robot",
            "result": { "label": "NO", "confidence": 0.97 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let iq = client_for(&server)
        .ask(&robot_detector(), &image)
        .await
        .unwrap();

    assert_eq!(iq.id, "iq_1");
    let result = iq.result.unwrap();
    assert_eq!(result.label, Label::No);
    assert_eq!(result.confidence, Some(0.97));
}

#[tokio::test]
async fn test_ask_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/image-queries"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .ask(&robot_detector(), b"jpeg")
        .await
        .unwrap_err();

    assert!(matches!(err, MlError::ServiceUnavailable(_)));
}

#[tokio::test]
async fn test_fetch_retries_transient_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/image-queries/iq_7"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/image-queries/iq_7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "iq_7",
            "result": { "label": "YES", "confidence": null }
        })))
        .mount(&server)
        .await;

    let iq = assert_ok!(client_for(&server).fetch("iq_7").await);
    assert_eq!(iq.definitive_answer(0.99), Some(true));
}

#[tokio::test]
async fn test_fetch_unknown_query() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/image-queries/iq_missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = assert_err!(client_for(&server).fetch("iq_missing").await);
    assert!(matches!(err, MlError::QueryNotFound(id) if id == "iq_missing"));
}

#[tokio::test]
async fn test_rejected_token_is_unauthorized() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/me"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = assert_err!(client_for(&server).check_connectivity().await);
    assert!(matches!(err, MlError::Unauthorized(_)));
}
