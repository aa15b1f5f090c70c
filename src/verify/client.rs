//! # 校验客户端
//!
//! ## 设计思路
//!
//! `Verifier` 是校验管线依赖的唯一接口：给一个码值，返回一次校验结论。
//! 生产实现 `HttpVerifier` 调用后端 `POST /scan?token=<value>`；
//! 测试可以注入任意实现，管线本身不关心传输细节。
//!
//! ## 实现思路
//!
//! - HTTP 客户端在构造时创建并复用，统一设置总超时与连接超时，保证请求一定会结束。
//! - 码值作为查询参数由 `Url::parse_with_params` 负责 URL 编码。
//! - 非 2xx 响应按后端错误格式提取文案，原样透传给操作员。
//! - 不做任何自动重试：重试就是操作员再扫一次。

use std::future::Future;
use std::time::Instant;

use reqwest::header::{ACCEPT, AUTHORIZATION};

use super::result::extract_error_message;
use super::{VerificationResult, VerifyError, redact_token};
use crate::config::{ApiConfig, ScanConfig};

/// 校验接口。
pub trait Verifier: Send + Sync + 'static {
    fn verify(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<VerificationResult, VerifyError>> + Send;
}

/// 基于后端 HTTP 接口的校验客户端。
pub struct HttpVerifier {
    client: reqwest::Client,
    api: ApiConfig,
    timeout_ms: u64,
}

impl HttpVerifier {
    pub fn new(api: ApiConfig, config: &ScanConfig) -> Result<Self, VerifyError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| VerifyError::Network(format!("无法创建 HTTP 客户端：{}", e)))?;

        Ok(Self {
            client,
            api,
            timeout_ms: config.request_timeout_ms,
        })
    }

    pub(crate) fn scan_url(&self, token: &str) -> Result<reqwest::Url, VerifyError> {
        let endpoint = format!("{}/scan", self.api.base_url);
        reqwest::Url::parse_with_params(&endpoint, &[("token", token)])
            .map_err(|e| VerifyError::Network(format!("校验地址无效：{}", e)))
    }

    async fn post_token(&self, token: &str) -> Result<VerificationResult, VerifyError> {
        let url = self.scan_url(token)?;

        let mut request = self.client.post(url).header(ACCEPT, "application/json");
        if let Some(auth) = self.api.auth_token.as_deref() {
            request = request.header(AUTHORIZATION, format!("Bearer {}", auth));
        }

        let response = request
            .send()
            .await
            .map_err(|e| VerifyError::from_reqwest(e, self.timeout_ms))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| VerifyError::from_reqwest(e, self.timeout_ms))?;

        if !status.is_success() {
            return Err(VerifyError::Rejected {
                status: status.as_u16(),
                message: extract_error_message(&body, status.as_u16()),
            });
        }

        VerificationResult::from_success_body(&body)
    }
}

impl Verifier for HttpVerifier {
    async fn verify(&self, token: &str) -> Result<VerificationResult, VerifyError> {
        let started = Instant::now();
        log::debug!("🎫 POST /scan - token: {}", redact_token(token));

        let result = self.post_token(token).await;
        match &result {
            Ok(verified) => log::debug!(
                "🎫 校验响应 {:?} - {}ms",
                verified.status,
                started.elapsed().as_millis()
            ),
            Err(err) => log::debug!(
                "🎫 校验失败 [{}] - {}ms: {}",
                err.code(),
                started.elapsed().as_millis(),
                err
            ),
        }
        result
    }
}
