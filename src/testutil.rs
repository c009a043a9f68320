//! Test support: a scripted chat-completions stub server.
//!
//! Each spawned stub answers requests in order from a fixed script and
//! counts how many calls it saw, which is what the retry tests assert on.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::openrouter::OpenRouter;

pub struct StubServer {
  pub base_url: String,
  hits: Arc<AtomicUsize>,
  shutdown_tx: mpsc::Sender<()>,
  handle: Option<thread::JoinHandle<()>>,
}

impl StubServer {
  /// Serve the given (status, body) responses in order. Requests beyond the
  /// script get a 500 so runaway retries fail loudly.
  pub fn spawn(responses: Vec<(u16, String)>) -> Self {
    let server = tiny_http::Server::http("127.0.0.1:0").expect("start stub server");
    let base_url = format!("http://{}", server.server_addr());
    let hits = Arc::new(AtomicUsize::new(0));
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

    let script = Arc::new(Mutex::new(responses.into_iter()));
    let thread_hits = hits.clone();

    let handle = thread::spawn(move || loop {
      if shutdown_rx.try_recv().is_ok() {
        break;
      }
      let request = match server.recv_timeout(Duration::from_millis(50)) {
        Ok(Some(req)) => req,
        Ok(None) => continue,
        Err(_) => break,
      };
      thread_hits.fetch_add(1, Ordering::SeqCst);

      let (status, body) = script.lock().unwrap().next().unwrap_or((
        500,
        r#"{"error": {"message": "stub script exhausted", "code": 500}}"#.to_string(),
      ));
      let header =
        tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
      let response =
        tiny_http::Response::from_string(body).with_status_code(status).with_header(header);
      let _ = request.respond(response);
    });

    Self { base_url, hits, shutdown_tx, handle: Some(handle) }
  }

  pub fn hits(&self) -> usize {
    self.hits.load(Ordering::SeqCst)
  }

  /// A gateway wired to this stub.
  pub fn gateway(&self) -> OpenRouter {
    OpenRouter {
      client: reqwest::Client::new(),
      api_key: "test-key".into(),
      base_url: self.base_url.clone(),
      text_model: "stub/text-model".into(),
      vision_model: "stub/vision-model".into(),
    }
  }
}

impl Drop for StubServer {
  fn drop(&mut self) {
    let _ = self.shutdown_tx.send(());
    if let Some(handle) = self.handle.take() {
      let _ = handle.join();
    }
  }
}

/// A well-formed success envelope with the given content string.
pub fn ok_chat_body(content: &str) -> String {
  serde_json::json!({
    "choices": [{"message": {"role": "assistant", "content": content}}],
    "usage": {"prompt_tokens": 120, "completion_tokens": 80, "total_tokens": 200}
  })
  .to_string()
}

/// An in-body provider error envelope (HTTP 200).
pub fn error_chat_body(code: u16, message: &str) -> String {
  serde_json::json!({"error": {"message": message, "code": code}}).to_string()
}
