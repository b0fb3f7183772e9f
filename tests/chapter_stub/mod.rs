use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

pub struct ChapterStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ChapterStub {
    /// `route` maps a request path and how many times that path has been
    /// requested before (0 for the first hit) to a status and body.
    pub fn spawn<F>(route: F) -> Self
    where
        F: Fn(&str, usize) -> (u16, String) + Send + 'static,
    {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start chapter stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}");

        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            let mut hits: HashMap<String, usize> = HashMap::new();
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().to_string();
                log.lock().expect("request log lock").push(path.clone());
                let hit = hits.entry(path.clone()).or_insert(0);
                let (status, body) = route(&path, *hit);
                *hit += 1;

                let header = tiny_http::Header::from_bytes(
                    &b"Content-Type"[..],
                    &b"text/html; charset=utf-8"[..],
                )
                .expect("build header");
                let response = tiny_http::Response::from_string(body)
                    .with_status_code(status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Paths requested so far, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("request log lock").clone()
    }
}

impl Drop for ChapterStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[allow(dead_code)]
pub fn chapter_page(body: &str) -> String {
    format!(
        r#"<!doctype html>
<html>
  <head><title>Chapter</title></head>
  <body>
    <div class="nav">Previous | Next</div>
    <div id="article">{body}</div>
  </body>
</html>
"#
    )
}

#[allow(dead_code)]
pub fn blank_page() -> String {
    r#"<!doctype html>
<html>
  <head><title>Loading</title></head>
  <body><div class="nav">Previous | Next</div></body>
</html>
"#
    .to_owned()
}
