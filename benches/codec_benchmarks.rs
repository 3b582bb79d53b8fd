use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use drawio_host::codec::{DiagramFormat, png, svg};
use std::hint::black_box;

/// Generate diagram XML with `cells` vertices
fn generate_diagram(cells: usize) -> String {
    let mut xml = String::from(
        "<mxfile host=\"drawio-host\"><diagram id=\"bench\" name=\"Page-1\"><mxGraphModel><root>\
         <mxCell id=\"0\"/><mxCell id=\"1\" parent=\"0\"/>",
    );
    for i in 0..cells {
        xml.push_str(&format!(
            "<mxCell id=\"c{i}\" value=\"Node &amp; {i}\" style=\"rounded=1;whiteSpace=wrap;\" \
             vertex=\"1\" parent=\"1\"><mxGeometry x=\"{x}\" y=\"{y}\" width=\"120\" height=\"60\" \
             as=\"geometry\"/></mxCell>",
            x = (i % 20) * 140,
            y = (i / 20) * 80,
        ));
    }
    xml.push_str("</root></mxGraphModel></diagram></mxfile>");
    xml
}

fn blank_png() -> Vec<u8> {
    let mut image = png::SIGNATURE.to_vec();
    png::write_chunk(&mut image, b"IHDR", &[0, 0, 0, 1, 0, 0, 0, 1, 8, 6, 0, 0, 0]);
    png::write_chunk(&mut image, b"IDAT", &[0x78, 0x9c, 0x63, 0x00, 0x00, 0x00, 0x01, 0x00]);
    png::write_chunk(&mut image, b"IEND", &[]);
    image
}

fn blank_svg() -> Vec<u8> {
    b"<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"120px\" height=\"60px\"><rect/></svg>"
        .to_vec()
}

fn containers(cells: usize) -> Vec<(DiagramFormat, Vec<u8>)> {
    let diagram = generate_diagram(cells);
    vec![
        (DiagramFormat::Drawio, diagram.clone().into_bytes()),
        (DiagramFormat::DrawioSvg, svg::encode(&blank_svg(), &diagram).unwrap()),
        (DiagramFormat::DrawioPng, png::encode(&blank_png(), &diagram).unwrap()),
    ]
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for cells in [10, 500, 5_000] {
        for (format, bytes) in containers(cells) {
            group.throughput(Throughput::Bytes(bytes.len() as u64));
            group.bench_with_input(
                BenchmarkId::new(format.extension(), cells),
                &bytes,
                |b, bytes| b.iter(|| format.decode(black_box(bytes)).unwrap()),
            );
        }
    }

    group.finish();
}

fn bench_noop_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("noop_save");

    for cells in [10, 500, 5_000] {
        for (format, bytes) in containers(cells) {
            let diagram = format.decode(&bytes).unwrap();
            group.bench_with_input(
                BenchmarkId::new(format.extension(), cells),
                &(bytes, diagram),
                |b, (bytes, diagram)| b.iter(|| format.encode(black_box(bytes), diagram).unwrap()),
            );
        }
    }

    group.finish();
}

fn bench_edited_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("edited_save");

    for cells in [10, 500, 5_000] {
        let edited = generate_diagram(cells + 1);
        for (format, bytes) in containers(cells) {
            group.bench_with_input(
                BenchmarkId::new(format.extension(), cells),
                &bytes,
                |b, bytes| b.iter(|| format.encode(black_box(bytes), &edited).unwrap()),
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_decode, bench_noop_save, bench_edited_save);
criterion_main!(benches);
