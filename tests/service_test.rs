//! Integration tests for the evaluation service client
//!
//! Tests HTTP behavior using wiremock for request/response mocking.

use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use questionnaire_flow::config::{RequestConfig, ServiceConfig};
use questionnaire_flow::error::ServiceError;
use questionnaire_flow::model::{AnswerMap, AnswerScalar, AnswerValue, NextAction, NextNode};
use questionnaire_flow::service::{
    AnswerRequest, EvaluateRequest, EvaluationClient, SubmitRequest,
};

/// Create a test client pointing to the mock server
fn create_test_client(base_url: &str) -> EvaluationClient {
    create_test_client_with_lang(base_url, None)
}

fn create_test_client_with_lang(base_url: &str, lang: Option<&str>) -> EvaluationClient {
    let config = ServiceConfig {
        base_url: base_url.to_string(),
        lang: lang.map(str::to_string),
    };

    let request_config = RequestConfig { timeout_ms: 5000 };

    EvaluationClient::new(&config, request_config).expect("Failed to create client")
}

fn sample_module_json() -> serde_json::Value {
    json!({
        "id": "m1",
        "title": "Scope",
        "description": "Basic product scope",
        "questions": [
            {
                "id": "q1",
                "text": "Is the product sold in the EU?",
                "kind": "boolean",
                "options": []
            }
        ]
    })
}

#[cfg(test)]
mod session_tests {
    use super::*;

    #[tokio::test]
    async fn test_start_returns_session_and_module() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/start"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "session_id": "sess-1",
                "module": sample_module_json()
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let response = client.start().await.expect("start should succeed");

        assert_eq!(response.session_id, "sess-1");
        assert_eq!(response.module.id, "m1");
        assert_eq!(response.module.questions.len(), 1);
    }

    #[tokio::test]
    async fn test_start_forwards_lang_parameter() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/start"))
            .and(query_param("lang", "de"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "session_id": "sess-2",
                "module": sample_module_json()
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client_with_lang(&mock_server.uri(), Some("de"));
        let response = client.start().await.expect("start should succeed");
        assert_eq!(response.session_id, "sess-2");
    }
}

#[cfg(test)]
mod tree_tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_tree_decodes_questions() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/tree"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "start": "q1",
                "questions": [
                    {
                        "id": "q1",
                        "text": "Is the device battery powered?",
                        "type": "single",
                        "options": [
                            {"value": "yes", "label": "Yes", "next": {"type": "question", "id": "q2"}},
                            {"value": "no", "label": "No", "next": {"type": "result", "id": "r1"}}
                        ]
                    }
                ]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let tree = client.fetch_tree().await.expect("tree should decode");

        assert_eq!(tree.start, "q1");
        let next = tree.questions[0].options[0].next.clone();
        assert_eq!(
            next,
            Some(NextNode::Question {
                id: "q2".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_fetch_question_not_found_maps_to_api_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/question/q99"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"detail": "question_not_found"})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let result = client.fetch_question("q99").await;

        match result {
            Err(ServiceError::Api { status, detail }) => {
                assert_eq!(status, 404);
                assert!(detail.unwrap().contains("question_not_found"));
            }
            other => panic!("expected Api error, got {:?}", other.map(|r| r.question.id)),
        }
    }

    #[tokio::test]
    async fn test_answer_returns_next_and_path() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/answer"))
            .and(body_partial_json(json!({"question_id": "q1", "value": "no"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "next": {"type": "result", "id": "r1"},
                "path": ["q1", "r1"],
                "result": {"id": "r1", "title": "Out of scope", "points": []}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let request = AnswerRequest {
            question_id: "q1".to_string(),
            value: AnswerValue::Scalar(AnswerScalar::Text("no".to_string())),
            answers: AnswerMap::new(),
        };
        let response = client.answer(&request).await.expect("answer should succeed");

        assert_eq!(
            response.next,
            NextNode::Result {
                id: "r1".to_string()
            }
        );
        assert_eq!(response.path, vec!["q1", "r1"]);
        assert_eq!(response.result.unwrap().title, "Out of scope");
    }

    #[tokio::test]
    async fn test_evaluate_decodes_evaluation() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/evaluate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result_id": "r2",
                "path": ["q1", "q2", "r2"],
                "result": {
                    "id": "r2",
                    "title": "In scope",
                    "description": "The product falls under the regulation.",
                    "points": ["Register the product", "Prepare documentation"]
                }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let request = EvaluateRequest {
            answers: AnswerMap::new(),
        };
        let evaluation = client
            .evaluate(&request)
            .await
            .expect("evaluate should succeed");

        assert_eq!(evaluation.result_id, "r2");
        assert_eq!(evaluation.result.points.len(), 2);
    }
}

#[cfg(test)]
mod module_tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_module_passes_session_id() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/module/m2"))
            .and(query_param("session_id", "sess-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "module": sample_module_json()
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let response = client
            .fetch_module("m2", "sess-1")
            .await
            .expect("module should decode");
        assert_eq!(response.module.id, "m1");
    }

    #[tokio::test]
    async fn test_submit_decodes_next_module() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/submit-answer"))
            .and(body_partial_json(json!({
                "session_id": "sess-1",
                "module_id": "m1",
                "replace": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "session_id": "sess-1",
                "parameters": {"in_scope": true},
                "next": {"type": "module", "module_id": "m2"},
                "module_complete": true,
                "module": {
                    "id": "m2",
                    "title": "Materials",
                    "questions": []
                }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let request = SubmitRequest {
            session_id: "sess-1".to_string(),
            module_id: Some("m1".to_string()),
            answers: AnswerMap::new(),
            replace: false,
        };
        let response = client.submit(&request).await.expect("submit should succeed");

        assert!(response.module_complete);
        assert_eq!(response.parameters["in_scope"], json!(true));
        assert_eq!(
            response.next,
            NextAction::Module {
                module_id: Some("m2".to_string()),
                message: None
            }
        );
        assert_eq!(response.module.unwrap().id, "m2");
    }

    #[tokio::test]
    async fn test_submit_decodes_conclusion() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/submit-answer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "session_id": "sess-1",
                "parameters": {},
                "next": {"type": "result", "message": "All done"},
                "module_complete": true,
                "conclusion": {"obligated": true}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let request = SubmitRequest {
            session_id: "sess-1".to_string(),
            module_id: None,
            answers: AnswerMap::new(),
            replace: false,
        };
        let response = client.submit(&request).await.expect("submit should succeed");

        assert_eq!(
            response.next,
            NextAction::Result {
                message: Some("All done".to_string())
            }
        );
        assert_eq!(response.conclusion.unwrap()["obligated"], json!(true));
    }

    #[tokio::test]
    async fn test_fetch_conclusion_by_session() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/result"))
            .and(query_param("session_id", "sess-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "parameters": {"scope": "eu"},
                "conclusion": {"obligated": false}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let response = client
            .fetch_conclusion("sess-1")
            .await
            .expect("conclusion should decode");

        assert_eq!(response.parameters["scope"], json!("eu"));
        assert_eq!(response.conclusion.unwrap()["obligated"], json!(false));
    }
}

#[cfg(test)]
mod error_mapping_tests {
    use super::*;

    #[tokio::test]
    async fn test_server_error_carries_body_detail() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/submit-answer"))
            .respond_with(
                ResponseTemplate::new(422).set_body_json(json!({"detail": "unknown_question"})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let request = SubmitRequest {
            session_id: "sess-1".to_string(),
            module_id: None,
            answers: AnswerMap::new(),
            replace: false,
        };
        let err = client.submit(&request).await.expect_err("should fail");

        assert_eq!(err.status(), Some(422));
    }

    #[tokio::test]
    async fn test_malformed_body_maps_to_invalid_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/tree"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri());
        let err = client.fetch_tree().await.expect_err("should fail");

        assert!(matches!(err, ServiceError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_timeout_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/results"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"results": []}))
                    .set_delay(std::time::Duration::from_millis(500)),
            )
            .mount(&mock_server)
            .await;

        let config = ServiceConfig {
            base_url: mock_server.uri(),
            lang: None,
        };
        let client = EvaluationClient::new(&config, RequestConfig { timeout_ms: 50 })
            .expect("Failed to create client");
        let err = client.fetch_results().await.expect_err("should time out");

        assert!(matches!(err, ServiceError::Timeout { timeout_ms: 50 }));
    }

    #[tokio::test]
    async fn test_connection_refused_maps_to_network_error() {
        // Port 1 is never listening
        let client = create_test_client("http://127.0.0.1:1");
        let err = client.fetch_tree().await.expect_err("should fail");

        assert!(matches!(
            err,
            ServiceError::Network { .. } | ServiceError::Http(_)
        ));
    }
}
