//! Remote-strategy walkthrough: mock the storefront backend, capture
//! through the async facade, then associate the design with an order.
//!
//! Run with: cargo run --example remote_save_demo

use studlink::{ArtifactBackend, Assist, CaptureConfig};

const PAGE: &str = r#"<html>
<body>
    <button id="download-instructions-button">Generate Instructions PDF</button>
    <input type="range" id="width-slider" value="64">
    <input type="range" id="height-slider" value="64">
    <table><tbody id="studs-used-table-body">
        <tr><td>Blue</td><td>1x1</td><td>300</td></tr>
        <tr><td>Yellow</td><td>1x1</td><td>120</td></tr>
    </tbody></table>
</body>
</html>"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr();
    let page_url = format!("http://{}/designer", addr);
    let endpoint = format!("http://{}/api/save-design-data.php", addr);

    std::thread::spawn(move || {
        let mut saves = 0u32;
        for request in server.incoming_requests() {
            if request.url().starts_with("/api/") {
                saves += 1;
                let body = if saves == 1 {
                    r#"{"success":true,"design_id":"design-demo-1"}"#
                } else {
                    r#"{"success":true}"#
                };
                let _ = request.respond(tiny_http::Response::from_string(body));
            } else {
                let _ = request.respond(tiny_http::Response::from_string(PAGE));
            }
        }
    });

    let config = CaptureConfig {
        backend: ArtifactBackend::Remote { endpoint },
        poll_interval_ms: 100,
        poll_attempts: 3,
        ..Default::default()
    };

    let assist = Assist::new(config).await?;

    let report = assist.capture(&page_url).await?;
    println!("stage:         {:?}", report.stage);
    println!("tracking code: {}", report.tracking_code.as_deref().unwrap_or("-"));
    if let Some(artifact) = &report.artifact {
        println!("artifact URL:  {}", artifact.share_text());
        println!("design id:     {}", artifact.design_id.as_deref().unwrap_or("-"));
    }

    let design_id = assist.associate_order("7001", None).await?;
    println!("associated design {} with order 7001", design_id);

    assist.close().await?;
    Ok(())
}
