use std::time::Duration;

use localgen::comfy::ComfyClient;
use localgen::error::GenError;
use localgen::lifecycle::NoopLifecycle;
use localgen::locator::ArtifactSource;
use localgen::orchestrator::{GenerationRequest, Generator};
use localgen::tracker::{Strategy, TrackerConfig};
use localgen::workflow::{Adapter, GenerationParams, Preset, QWEN_LIGHTNING_LORA};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn qwen_request(output: Option<std::path::PathBuf>) -> GenerationRequest {
    GenerationRequest {
        preset: Preset::QwenImage,
        params: GenerationParams {
            prompt: "a poster that says HELLO".into(),
            negative_prompt: String::new(),
            width: 1328,
            height: 1328,
            frames: 1,
            fps: 1.0,
            steps: 4,
            seed: 1234,
            checkpoint: Preset::QwenImage.default_checkpoint().into(),
            adapter: Some(Adapter {
                name: QWEN_LIGHTNING_LORA.into(),
                strength: 1.0,
            }),
        },
        output,
        tracker: TrackerConfig {
            poll_interval: Duration::from_millis(20),
            timeout: Duration::from_secs(5),
        },
        push: false,
        restart_server: false,
        stop_after: false,
    }
}

async fn mount_job(server: &MockServer, filename: &str) {
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "prompt_id": "qwen-1", "number": 3, "node_errors": {}
        })))
        .expect(1)
        .mount(server)
        .await;
    // First query: no entry yet. Second: finished.
    Mock::given(method("GET"))
        .and(path("/history/qwen-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/history/qwen-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "qwen-1": {
                "status": {"status_str": "success", "completed": true, "messages": []},
                "outputs": {"9": {"images": [
                    {"filename": "qwen_image_00001_.png", "subfolder": "", "type": "temp"},
                    {"filename": filename, "subfolder": "", "type": "output"}
                ]}}
            }
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn qwen_lightning_job_is_submitted_tracked_and_downloaded() {
    let server = MockServer::start().await;
    mount_job(&server, "qwen_image_00002_.png").await;
    Mock::given(method("GET"))
        .and(path("/view"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 64]))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("poster.png");
    let client = ComfyClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
    let runner = Generator::new(client, NoopLifecycle, None);

    let record = runner.run(&qwen_request(Some(dest.clone())), &()).await.unwrap();

    assert_eq!(record.job_id, "qwen-1");
    assert_eq!(record.strategy, Strategy::Polling);
    assert_eq!(record.polls, 2);
    assert_eq!(record.bytes, 64);
    assert_eq!(std::fs::read(&dest).unwrap().len(), 64);
    match &record.source {
        ArtifactSource::Remote(reference) => {
            assert_eq!(reference.filename, "qwen_image_00002_.png")
        }
        other => panic!("expected a remote artifact, got {other:?}"),
    }

    let requests = server.received_requests().await.unwrap();
    let submitted: serde_json::Value = requests
        .iter()
        .find(|r| r.url.path() == "/prompt")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .unwrap();
    let graph = submitted["prompt"].as_object().unwrap();
    let lora = graph
        .values()
        .find(|node| node["class_type"] == "LoraLoader")
        .expect("adapter node in submitted graph");
    assert_eq!(lora["inputs"]["lora_name"], QWEN_LIGHTNING_LORA);
    assert_eq!(submitted["client_id"], record.client_id.as_str());
}

#[tokio::test]
async fn local_output_directory_wins_over_download() {
    let server = MockServer::start().await;
    mount_job(&server, "qwen_image_00002_.png").await;
    Mock::given(method("GET"))
        .and(path("/view"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let output_dir = tempfile::tempdir().unwrap();
    let on_disk = output_dir.path().join("qwen_image_00002_.png");
    std::fs::write(&on_disk, b"local bytes").unwrap();

    let client = ComfyClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
    let runner = Generator::new(client, NoopLifecycle, Some(output_dir.path().to_path_buf()));

    let record = runner.run(&qwen_request(None), &()).await.unwrap();

    assert_eq!(record.artifact, on_disk);
    assert_eq!(record.bytes, 11);
    assert!(matches!(record.source, ArtifactSource::Local(_)));
}

#[tokio::test]
async fn stale_file_in_output_directory_is_not_delivered() {
    let server = MockServer::start().await;
    mount_job(&server, "qwen_image_00007_.png").await;
    Mock::given(method("GET"))
        .and(path("/view"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fresh".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    // Left behind by an earlier run, or written by another server.
    let output_dir = tempfile::tempdir().unwrap();
    std::fs::write(output_dir.path().join("qwen_image_00001_.png"), b"stale").unwrap();

    let dest_dir = tempfile::tempdir().unwrap();
    let dest = dest_dir.path().join("poster.png");
    let client = ComfyClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
    let runner = Generator::new(client, NoopLifecycle, Some(output_dir.path().to_path_buf()));

    let record = runner.run(&qwen_request(Some(dest.clone())), &()).await.unwrap();

    assert!(matches!(record.source, ArtifactSource::Remote(_)));
    assert_eq!(std::fs::read(&dest).unwrap(), b"fresh");
}

#[tokio::test]
async fn unreachable_server_is_a_connection_error() {
    let client = ComfyClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
    let runner = Generator::new(client, NoopLifecycle, None);

    let err = runner.run(&qwen_request(None), &()).await.unwrap_err();
    assert!(matches!(err, GenError::Connection { .. }));
    assert!(err.hint().is_some());
}
