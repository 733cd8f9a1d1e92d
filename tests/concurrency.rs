//! Conversions share nothing but the read-only registry.

use converter::{ConvertOptions, JenkinsJsonConverter, SourceConverter};

#[test]
fn concurrent_conversions_match_sequential() {
    let json = include_str!("fixtures/declarative_pipeline.json");
    let converter = JenkinsJsonConverter::new();
    let options = ConvertOptions::default();
    let expected = converter.convert(json, &options).unwrap();

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| converter.convert(json, &options).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for result in results {
        assert_eq!(result, expected);
    }
}

#[test]
fn tool_dedup_state_does_not_leak_between_conversions() {
    let json = include_str!("fixtures/declarative_pipeline.json");
    let converter = JenkinsJsonConverter::new();
    let options = ConvertOptions::default();
    for _ in 0..2 {
        let conversion = converter.convert(json, &options).unwrap();
        let steps = &conversion.pipeline.spec.stages[0].spec.steps;
        assert_eq!(steps[1].id, "Mavensh0000");
    }
}
