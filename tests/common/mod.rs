//! Shared test infrastructure for integration tests.
#![allow(dead_code)]

use serde_json::{json, Value};
use std::env;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tiny_http::{Response, Server};

pub fn manifest_dir() -> PathBuf {
    PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into()))
}

/// Fixture specifications: `right.html`, `wrong.html` and a nested subtree.
pub fn specs_dir() -> PathBuf {
    manifest_dir().join("tests/fixtures/specs")
}

pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    for dir in env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// The mock renderer is a shell script; skip when no `sh` is available.
pub fn skip_without_sh() -> bool {
    let missing = find_in_path("sh").is_none();
    if missing {
        eprintln!("Skipping: sh not available");
    }
    missing
}

/// Command line for `tests/mock-render.sh`, which echoes its input and exits
/// according to the document's `data-expect` marker.
pub fn mock_render_command() -> String {
    let script = manifest_dir().join("tests/mock-render.sh");
    format!("sh {}", shell_words::quote(&script.display().to_string()))
}

/// Write a run config into `dir` and return its path.
pub fn write_config(dir: &Path, config: &Value) -> PathBuf {
    let path = dir.join("specrun.json");
    let text = serde_json::to_string_pretty(config).expect("serialize config");
    fs::write(&path, text).expect("write config");
    path
}

/// Config with one file-system repository over the fixture specs.
pub fn file_system_config(name: &str, tests: &[&str], suites: &[&str]) -> Value {
    json!({
        "schema_version": 1,
        "reports_directory": "reports",
        "repositories": [{
            "name": name,
            "type": "file_system",
            "root": specs_dir().display().to_string(),
            "tests": tests,
            "suites": suites,
        }]
    })
}

/// One canned reply from the XML-RPC stub.
#[derive(Debug, Clone)]
pub struct StubReply {
    pub body: String,
    pub delay: Duration,
}

impl StubReply {
    pub fn rendered(html: &str) -> Self {
        Self {
            body: rendered_response(html),
            delay: Duration::ZERO,
        }
    }

    pub fn fault(code: i32, message: &str) -> Self {
        Self {
            body: fault_response(code, message),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Minimal XML-RPC endpoint serving one reply per request, in order.
pub struct RpcStub {
    pub url: String,
    requests: Arc<Mutex<Vec<String>>>,
    handle: thread::JoinHandle<()>,
}

impl RpcStub {
    pub fn start(replies: Vec<StubReply>) -> Self {
        let server = Server::http("127.0.0.1:0").expect("bind stub server");
        let addr = server.server_addr().to_ip().expect("stub server ip address");
        let url = format!("http://{addr}/rpc/xmlrpc");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();
        let handle = thread::spawn(move || {
            for reply in replies {
                let Ok(mut request) = server.recv() else {
                    return;
                };
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                recorded.lock().expect("stub lock").push(body);
                if !reply.delay.is_zero() {
                    thread::sleep(reply.delay);
                }
                let _ = request.respond(Response::from_string(reply.body));
            }
        });
        Self {
            url,
            requests,
            handle,
        }
    }

    /// Remote root for `space` with the handler query used by wiki servers.
    pub fn root(&self, space: &str) -> String {
        format!(
            "{}?includeStyle=true&handler=greenpepper1#{space}",
            self.url
        )
    }

    /// Wait for every reply to be served and return the request bodies.
    pub fn finish(self) -> Vec<String> {
        self.handle.join().expect("stub thread");
        let requests = self.requests.lock().expect("stub lock");
        requests.clone()
    }
}

pub fn rendered_response(html: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?><methodResponse><params><param><value><string>{}</string></value></param></params></methodResponse>",
        escape(html)
    )
}

pub fn fault_response(code: i32, message: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?><methodResponse><fault><value><struct>\
<member><name>faultCode</name><value><int>{code}</int></value></member>\
<member><name>faultString</name><value><string>{}</string></value></member>\
</struct></value></fault></methodResponse>",
        escape(message)
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
