//! 5xx report sink (C7), backed by `tonic`.
//!
//! Grounded on `internal/network/grpcclient.go`: one `PushResultReq` per
//! completed task whose `forwardTo` included `"5XX"`, carrying one `Result`
//! per matched response, each wrapping a single `"5XX-error"` PoC.

use async_trait::async_trait;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tonic::transport::Channel;

use crate::error::{Res, ResExt};
use crate::model::Response;

pub mod proto {
    tonic::include_proto!("crawler.report");
}

use proto::report_service_client::ReportServiceClient;
use proto::{PoC, PushResultReq, Result as ReportResult, TestResult};

const ERR_5XX_TYPE: &str = "5XX-error";

#[async_trait]
pub trait RpcSink: Send + Sync {
    async fn push_5xx(&mut self, task_id: &str, responses: &[Response]) -> Res<()>;
    async fn close(&mut self) -> Res<()>;
}

fn result_for(response: &Response, start_time: &str) -> ReportResult {
    let reason = http::StatusCode::from_u16(response.status_code)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("");

    let poc = PoC {
        r#type: ERR_5XX_TYPE.to_string(),
        payload: format!("HTTP status: {} {reason}", response.status_code),
        data: response.link.url.clone(),
        evidence: response.link.url.clone(),
    };

    ReportResult { url: response.link.url.clone(), start_time: start_time.to_string(), pocs: vec![poc] }
}

pub struct GrpcRpcSink {
    client: ReportServiceClient<Channel>,
}

impl GrpcRpcSink {
    pub async fn connect(addr: String) -> Res<Self> {
        let endpoint = if addr.starts_with(':') { format!("http://127.0.0.1{addr}") } else { addr };
        let client = ReportServiceClient::connect(endpoint).await.context("Failed to dial report RPC service")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RpcSink for GrpcRpcSink {
    async fn push_5xx(&mut self, task_id: &str, responses: &[Response]) -> Res<()> {
        let start_time = OffsetDateTime::now_utc().format(&Rfc3339).context("Failed to format crawl start time")?;

        let results = responses.iter().map(|r| result_for(r, &start_time)).collect();

        let req = PushResultReq {
            id: task_id.to_string(),
            test_result: Some(TestResult { r#type: ERR_5XX_TYPE.to_string(), results }),
        };

        self.client.push_result(req).await.context("Failed to push 5xx report")?;
        Ok(())
    }

    async fn close(&mut self) -> Res<()> {
        Ok(())
    }
}
