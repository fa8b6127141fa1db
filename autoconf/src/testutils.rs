use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, USER_AGENT};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use parking_lot::Mutex;
use shared::http::make_error_response;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A valid document whose only distinguishing feature is its version.
pub fn sample_document(version: i64) -> String {
    format!(
        r#"{{
  "Version": {version},
  "Schema": 1,
  "CacheTTL": 86400,
  "SystemRegistry": {{
    "AminoDHT": {{
      "URL": "https://github.com/ipfs/specs/pull/497",
      "Description": "Public DHT swarm",
      "NativeConfig": {{
        "Bootstrap": ["/ip4/10.0.0.{version}/tcp/4001/p2p/QmaCpDMGvV2BGHeYERUEnRQAwe3N8SzbUtfsmvsqQLuvuJ"]
      }}
    }}
  }},
  "DNSResolvers": {{ "eth.": ["https://dns.eth.limo/dns-query"] }},
  "DelegatedEndpoints": {{
    "https://cid.contact": {{ "Systems": ["IPNI"], "Read": ["/routing/v1/providers"], "Write": [] }}
  }}
}}"#
    )
}

#[derive(Clone, Debug, Default)]
pub struct RecordedRequest {
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<String>,
    pub user_agent: Option<String>,
}

struct ServerState {
    status: StatusCode,
    body: Bytes,
    etag: Option<String>,
    last_modified: Option<String>,
    requests: Vec<RecordedRequest>,
}

/// In-process autoconf endpoint. Answers conditional requests with 304 when
/// the presented token matches the one currently served.
pub struct TestAutoConfServer {
    addr: SocketAddr,
    state: Arc<Mutex<ServerState>>,
    handle: JoinHandle<()>,
}

impl TestAutoConfServer {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(ServerState {
            status: StatusCode::NOT_FOUND,
            body: Bytes::new(),
            etag: None,
            last_modified: None,
            requests: Vec::new(),
        }));

        let service = MockService {
            state: state.clone(),
        };
        let handle = tokio::spawn(async move {
            let _ = shared::http::serve::<_, io::Error>(listener, service).await;
        });

        TestAutoConfServer {
            addr,
            state,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}/autoconf.json", self.addr)
    }

    pub fn serve(&self, body: impl Into<Bytes>, etag: Option<&str>, last_modified: Option<&str>) {
        let mut state = self.state.lock();
        state.status = StatusCode::OK;
        state.body = body.into();
        state.etag = etag.map(String::from);
        state.last_modified = last_modified.map(String::from);
    }

    pub fn fail_with(&self, status: StatusCode) {
        self.state.lock().status = status;
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().requests.len()
    }
}

impl Drop for TestAutoConfServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct MockService {
    state: Arc<Mutex<ServerState>>,
}

fn header(req: &Request<Incoming>, name: hyper::header::HeaderName) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

impl Service<Request<Incoming>> for MockService {
    type Response = Response<BoxBody<Bytes, io::Error>>;
    type Error = io::Error;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let recorded = RecordedRequest {
            if_none_match: header(&req, IF_NONE_MATCH),
            if_modified_since: header(&req, IF_MODIFIED_SINCE),
            user_agent: header(&req, USER_AGENT),
        };

        let mut state = self.state.lock();
        let not_modified = match (&recorded.if_none_match, &recorded.if_modified_since) {
            (Some(tag), _) => state.etag.as_ref() == Some(tag),
            (None, Some(since)) => state.last_modified.as_ref() == Some(since),
            (None, None) => false,
        };
        state.requests.push(recorded);

        let res = if state.status != StatusCode::OK {
            make_error_response(state.status)
        } else if not_modified {
            make_error_response(StatusCode::NOT_MODIFIED)
        } else {
            let mut builder = Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, "application/json");
            if let Some(etag) = &state.etag {
                builder = builder.header(ETAG, etag.as_str());
            }
            if let Some(last_modified) = &state.last_modified {
                builder = builder.header(LAST_MODIFIED, last_modified.as_str());
            }
            builder
                .body(Full::new(state.body.clone()).map_err(|e| match e {}).boxed())
                .unwrap()
        };

        Box::pin(async move { Ok(res) })
    }
}
