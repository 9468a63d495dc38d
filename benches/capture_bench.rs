use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::BTreeMap;
use studlink::page::DesignPage;
use studlink::render::DesignImage;
use studlink::snapshot::{DesignConfig, DesignSnapshot, SnapshotExtractor};
use studlink::tracking::IdGenerator;
use studlink::PageSelectors;

fn bench_snapshot_extraction(c: &mut Criterion) {
    let mut rows = String::new();
    for i in 0..40 {
        rows.push_str(&format!(
            "<tr><td>Color {}</td><td>1x1</td><td>{}</td></tr>",
            i,
            i * 3 + 1
        ));
    }
    let html = format!(
        r#"<html><body>
            <button id="download-instructions-button">Generate Instructions PDF</button>
            <input id="width-slider" value="64"><input id="height-slider" value="64">
            <table><tbody id="studs-used-table-body">{}</tbody></table>
        </body></html>"#,
        rows
    );
    let extractor = SnapshotExtractor::new(PageSelectors::default());

    c.bench_function("snapshot_extraction", |b| {
        b.iter(|| {
            let page = DesignPage::from_html(html.clone(), "http://bench.local/");
            let snapshot = extractor.extract(&page, "vb_bench");
            black_box(snapshot.total_pieces)
        })
    });
}

fn bench_placeholder_png(c: &mut Criterion) {
    let mut pieces = BTreeMap::new();
    pieces.insert("Red".to_string(), 120);
    pieces.insert("Blue".to_string(), 60);
    pieces.insert("Yellow".to_string(), 20);
    let snapshot = DesignSnapshot::new("vb_bench", pieces, DesignConfig::default());

    c.bench_function("placeholder_png", |b| {
        b.iter(|| {
            let png = DesignImage::placeholder(&snapshot).to_png().unwrap();
            black_box(png.len())
        })
    });
}

fn bench_tracking_codes(c: &mut Criterion) {
    c.bench_function("tracking_codes", |b| {
        b.iter(|| black_box(IdGenerator::new(None).tracking_code()))
    });
}

criterion_group!(
    benches,
    bench_snapshot_extraction,
    bench_placeholder_png,
    bench_tracking_codes
);
criterion_main!(benches);
