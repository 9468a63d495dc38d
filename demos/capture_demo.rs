//! Local-strategy walkthrough: serve a design page, capture it, print
//! the report.
//!
//! Run with: cargo run --example capture_demo

use studlink::flow::{CaptureFlow, FlowEvent};
use studlink::CaptureConfig;

const PAGE: &str = r#"<html>
<body>
    <button id="download-instructions-button">Generate Instructions PDF</button>
    <input type="range" id="width-slider" value="48">
    <input type="range" id="height-slider" value="48">
    <table><tbody id="studs-used-table-body">
        <tr><td>Red</td><td>1x1</td><td>240</td></tr>
        <tr><td>White</td><td>1x1</td><td>180</td></tr>
        <tr><td>Black</td><td>1x1</td><td>60</td></tr>
    </tbody></table>
    <canvas id="step-4-canvas"></canvas>
</body>
</html>"#;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let url = format!("http://{}/designer", server.server_addr());
    std::thread::spawn(move || {
        for request in server.incoming_requests() {
            let _ = request.respond(tiny_http::Response::from_string(PAGE));
        }
    });

    let config = CaptureConfig {
        poll_interval_ms: 100,
        poll_attempts: 3,
        product_url: Some("https://visubloq.com/products/custom-mosaic".to_string()),
        ..Default::default()
    };

    let mut flow = CaptureFlow::new(config)?;
    flow.on_event(Box::new(|event| {
        if let FlowEvent::StageChanged(stage) = event {
            println!("stage: {:?}", stage);
        }
    }));

    let report = flow.run(&url, false)?;

    println!();
    println!("tracking code: {}", report.tracking_code.as_deref().unwrap_or("-"));
    if let Some(artifact) = &report.artifact {
        println!("share text:    {}", artifact.share_text());
        if let Some(digest) = &artifact.digest {
            println!("digest:        {}", digest);
        }
    }
    if let Some(checkout) = &report.checkout_url {
        println!("checkout URL:  {}", checkout);
    }
    for notice in &report.notices {
        println!("notice:        {}", notice);
    }

    flow.close()?;
    Ok(())
}
