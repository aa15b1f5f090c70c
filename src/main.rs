//! # UniPass 扫码签到 — 站点程序入口
//!
//! 本文件只负责参数解析、日志初始化与输入输出。
//! 会话逻辑分布在各子模块中，详见 `lib.rs` 架构文档。
//!
//! - 默认模式：标准输入视为键盘楔形扫码枪，每一行都走完整的扫码会话链路
//! - `--manual`：每一行都是一次手动提交，不做去重

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Local;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use unipass_scanner::camera::{CameraDevice, CameraState, TextCamera};
use unipass_scanner::config::{ApiConfig, ScanConfig, ScanProfile};
use unipass_scanner::decode::TextDecoder;
use unipass_scanner::error::AppError;
use unipass_scanner::scan::{NotificationBus, ScanSession, SessionEvent};
use unipass_scanner::settings::load_settings;
use unipass_scanner::verify::{HttpVerifier, ScanStatus, VerificationResult, submit_manual_token};

#[derive(Debug, Parser)]
#[command(name = "unipass-scanner", version, about = "UniPass 活动签到扫码站")]
struct Args {
    /// 后端地址（覆盖 UNIPASS_API_URL）
    #[arg(long)]
    api_url: Option<String>,

    /// 设置文件路径（settings.json）
    #[arg(long)]
    settings: Option<PathBuf>,

    /// 时间窗档位：strict / balanced / rapid
    #[arg(long)]
    profile: Option<String>,

    /// 手动输入模式：每行一次提交，不经过去重
    #[arg(long)]
    manual: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("❌ {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), AppError> {
    let mut config = match &args.settings {
        Some(path) => load_settings(path)?,
        None => ScanConfig::default(),
    };
    if let Some(profile) = &args.profile {
        config.apply_profile(ScanProfile::parse(profile)?);
        config.validate()?;
    }

    let mut api = ApiConfig::from_env()?;
    if let Some(url) = &args.api_url {
        api = ApiConfig::new(url)?.with_auth_token(api.auth_token);
    }

    log::info!(
        "🚀 扫码站启动（后端: {}，档位: {}，模式: {}）",
        api.base_url,
        config.infer_profile().as_str(),
        if args.manual { "手动输入" } else { "扫码枪" }
    );

    let verifier = HttpVerifier::new(api, &config)?;
    if args.manual {
        run_manual(&verifier, &config).await
    } else {
        run_station(verifier, config).await
    }
}

async fn run_manual(verifier: &HttpVerifier, config: &ScanConfig) -> Result<(), AppError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match submit_manual_token(verifier, &line, config.request_timeout()).await {
            Ok(result) => print_result(&result),
            Err(err) => println!("⚠️  {}", err),
        }
    }

    Ok(())
}

async fn run_station(verifier: HttpVerifier, config: ScanConfig) -> Result<(), AppError> {
    let (camera, feed) = TextCamera::new();
    let bus = NotificationBus::new();
    let _printer = bus.register(print_event);

    let (handle, session) = ScanSession::spawn(
        config,
        CameraDevice::new(camera),
        TextDecoder,
        Arc::new(verifier),
        bus,
    )?;

    let state = handle.enable_camera().await?;
    if state != CameraState::Active {
        handle.shutdown().await?;
        return Err(AppError::InvalidInput(format!("扫码枪未就绪（{:?}）", state)));
    }
    println!("📷 扫码枪已就绪，等待扫码（Ctrl-D 结束）");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if feed.push(line) == 0 {
            log::debug!("⌨️ 摄像头未激活，丢弃一行输入");
        }
    }

    feed.drained().await;
    handle.finish().await?;
    if let Err(err) = session.await {
        log::warn!("⚠️ 会话任务异常结束: {}", err);
    }

    let snapshot = handle.snapshot();
    println!("👋 本次共签到 {} 人次", snapshot.scan_count);
    Ok(())
}

fn print_event(event: &SessionEvent) {
    if let Some(text) = describe_event(event) {
        println!("{}", text);
    }
}

/// 站点终端只展示校验结论与权限错误；提示消息与结论重复，不单独打印。
fn describe_event(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::VerificationFinished { result, .. } => Some(describe_result(result)),
        SessionEvent::PermissionError { reason } => Some(format!("🚫 {}", reason)),
        _ => None,
    }
}

fn print_result(result: &VerificationResult) {
    println!("{}", describe_result(result));
}

fn describe_result(result: &VerificationResult) -> String {
    let icon = match result.status {
        ScanStatus::Success => "✅",
        ScanStatus::AlreadyScanned => "ℹ️ ",
        ScanStatus::Error => "❌",
    };
    let mut lines = vec![format!("{} {}", icon, result.message)];

    if let Some(name) = &result.student_name {
        let prn = result.student_prn.as_deref().unwrap_or("-");
        lines.push(format!("   {}（{}）", name, prn));
    }
    if let (Some(current), Some(total)) = (result.current_day, result.total_days) {
        lines.push(format!(
            "   第 {}/{} 天，已出勤 {} 天",
            current,
            total,
            result.attended_days.unwrap_or(0)
        ));
    }
    if let Some(at) = result.scanned_at {
        lines.push(format!(
            "   签到时间 {}",
            at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        ));
    }
    if let Some(message) = &result.completion_message {
        lines.push(format!("   🎓 {}", message));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use unipass_scanner::scan::Severity;
    use unipass_scanner::verify::ScanSource;

    #[test]
    fn station_prints_results_and_permission_errors_only() {
        let result = VerificationResult::from_success_body(
            r#"{"status":"success","message":"Welcome","student_name":"Asha","student_prn":"PRN1"}"#,
        )
        .expect("valid body");

        let finished = SessionEvent::VerificationFinished {
            dispatch: 1,
            source: ScanSource::Camera,
            result,
        };
        assert_eq!(
            describe_event(&finished).as_deref(),
            Some("✅ Welcome\n   Asha（PRN1）")
        );

        let denied = SessionEvent::PermissionError {
            reason: "摄像头被占用".to_string(),
        };
        assert_eq!(describe_event(&denied).as_deref(), Some("🚫 摄像头被占用"));

        for severity in [Severity::Success, Severity::Info, Severity::Error] {
            let toast = SessionEvent::Toast {
                severity,
                message: "Welcome".to_string(),
            };
            assert_eq!(describe_event(&toast), None);
        }
        assert_eq!(describe_event(&SessionEvent::ResultCleared), None);
    }
}
