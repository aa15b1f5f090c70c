use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use unipass_scanner::config::{ApiConfig, ScanConfig};
use unipass_scanner::verify::{
    HttpVerifier, ScanStatus, Verifier, VerifyError, verify_with_deadline,
};

/// 单连接测试服务器：读取请求头后写回固定响应，返回 (端口, 首行请求)。
fn serve_once(status_line: &'static str, body: &'static str) -> (u16, thread::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
    let port = listener.local_addr().expect("read local addr failed").port();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept failed");

        let mut req_buf = [0u8; 4096];
        let read = stream.read(&mut req_buf).unwrap_or(0);
        let request = String::from_utf8_lossy(&req_buf[..read]).to_string();

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        stream
            .write_all(response.as_bytes())
            .expect("write response failed");
        stream.flush().expect("flush failed");

        request.lines().next().unwrap_or_default().to_string()
    });

    (port, server)
}

fn verifier_for(port: u16, config: &ScanConfig) -> HttpVerifier {
    let api = ApiConfig::new(&format!("http://127.0.0.1:{}/api/", port)).expect("api config failed");
    HttpVerifier::new(api, config).expect("verifier init failed")
}

#[tokio::test]
async fn success_body_is_parsed_into_result() {
    let (port, server) = serve_once(
        "200 OK",
        r#"{"status":"success","message":"Welcome, Asha!","attendance_id":41,
            "student_name":"Asha Rao","student_prn":"PRN-0042","event_id":7,
            "scanned_at":"2026-03-02T09:15:30.123456","current_day":2,"total_days":3,
            "attended_days":2,"days_remaining":1,"certificate_unlocked":false}"#,
    );

    let verifier = verifier_for(port, &ScanConfig::default());
    let result = verifier.verify("eyJ.token+/=").await.expect("verify failed");
    let request_line = server.join().expect("server thread failed");

    assert!(request_line.starts_with("POST /api/scan?token=eyJ.token%2B%2F%3D"));
    assert_eq!(result.status, ScanStatus::Success);
    assert_eq!(result.message, "Welcome, Asha!");
    assert_eq!(result.attendance_id, Some(41));
    assert_eq!(result.student_prn.as_deref(), Some("PRN-0042"));
    assert_eq!(result.current_day, Some(2));
    assert!(result.scanned_at.is_some());
    assert!(result.counts_as_scan());
}

#[tokio::test]
async fn already_scanned_is_not_an_error() {
    let (port, server) = serve_once(
        "200 OK",
        r#"{"status":"already_scanned","message":"Already marked present for day 1"}"#,
    );

    let result = verifier_for(port, &ScanConfig::default())
        .verify("T1")
        .await
        .expect("verify failed");
    server.join().expect("server thread failed");

    assert_eq!(result.status, ScanStatus::AlreadyScanned);
    assert!(!result.is_error());
    assert!(!result.counts_as_scan());
    assert_eq!(result.message, "Already marked present for day 1");
}

#[tokio::test]
async fn rejection_detail_is_passed_through_verbatim() {
    for (status_line, body, code, message) in [
        ("401 Unauthorized", r#"{"detail":"Invalid or expired QR code"}"#, 401, "Invalid or expired QR code"),
        ("403 Forbidden", r#"{"detail":"Event has not started yet"}"#, 403, "Event has not started yet"),
        ("429 Too Many Requests", r#"{"error":"Rate limit exceeded: 60 per 1 minute"}"#, 429, "Rate limit exceeded: 60 per 1 minute"),
        ("500 Internal Server Error", "<html>oops</html>", 500, "签到服务返回错误（HTTP 500）"),
    ] {
        let (port, server) = serve_once(status_line, body);
        let err = verifier_for(port, &ScanConfig::default())
            .verify("T1")
            .await
            .expect_err("expected rejection");
        server.join().expect("server thread failed");

        assert_eq!(
            err,
            VerifyError::Rejected {
                status: code,
                message: message.to_string()
            }
        );
        assert_eq!(err.user_message(), message);
        assert_eq!(err.stage(), "response");
    }
}

#[tokio::test]
async fn garbage_success_body_is_a_response_error() {
    let (port, server) = serve_once("200 OK", "not json at all");

    let err = verifier_for(port, &ScanConfig::default())
        .verify("T1")
        .await
        .expect_err("expected decode failure");
    server.join().expect("server thread failed");

    assert!(matches!(err, VerifyError::Response(_)));
    assert_eq!(err.code(), "E_RESPONSE");
}

#[tokio::test]
async fn silent_server_times_out_into_error_result() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
    let port = listener.local_addr().expect("read local addr failed").port();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept failed");
        let mut req_buf = [0u8; 4096];
        let _ = stream.read(&mut req_buf);
        thread::sleep(Duration::from_millis(2_500));
    });

    let config = ScanConfig {
        request_timeout_ms: 1_000,
        connect_timeout_ms: 500,
        ..ScanConfig::default()
    };
    let verifier = verifier_for(port, &config);

    let result = verify_with_deadline(&verifier, "T1", config.request_timeout()).await;
    server.join().expect("server thread failed");

    assert_eq!(result.status, ScanStatus::Error);
    assert_eq!(result.error_code, Some("E_TIMEOUT"));
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind failed");
        listener.local_addr().expect("read local addr failed").port()
    };

    let err = verifier_for(port, &ScanConfig::default())
        .verify("T1")
        .await
        .expect_err("expected connect failure");

    assert!(matches!(err, VerifyError::Network(_)));
    assert_eq!(err.stage(), "send");
}
