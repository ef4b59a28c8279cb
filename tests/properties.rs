//! Property tests for pipeline invariants.

use chartform::{
    extrema::{ExtremaExtractor, Extremum},
    overlap::{index_iou, OverlapResolver},
    prelude::*,
    trendline::fit_line,
};
use proptest::prelude::*;

fn random_walk(start: f64, steps: &[f64]) -> Vec<Bar> {
    let mut prev = start;
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let close = (prev + step).max(1.0);
            let bar = Bar::new(
                i as i64 * 3_600,
                prev,
                prev.max(close) + 0.25,
                prev.min(close) - 0.25,
                close,
                1000.0 + (i % 7) as f64 * 150.0,
            );
            prev = close;
            bar
        })
        .collect()
}

fn alternates(extrema: &[Extremum]) -> bool {
    extrema
        .windows(2)
        .all(|w| w[0].kind != w[1].kind && w[0].index < w[1].index)
}

fn scored(start: usize, len: usize, confidence: f64, pattern_type: PatternType) -> ScoredPattern {
    ScoredPattern {
        candidate: PatternCandidate::new(
            pattern_type,
            pattern_type.typical_signal(),
            start,
            start + len,
            KeyLevels::new(100.0, 110.0, 95.0),
        ),
        quality_score: 0.5,
        confidence,
        prior_trend: Trend::Sideways,
        start_time: None,
        end_time: None,
    }
}

proptest! {
    #[test]
    fn extrema_alternate(
        closes in prop::collection::vec(1.0f64..200.0, 0..300),
        order in 1usize..8,
        prominence in 0.1f64..3.0,
    ) {
        let vol = vec![1.0; closes.len()];
        let extrema = ExtremaExtractor::new(order, prominence).unwrap().extract(&closes, &vol);
        prop_assert!(alternates(&extrema));
    }

    #[test]
    fn swing_filter_is_an_alternating_subset(
        closes in prop::collection::vec(50.0f64..150.0, 0..300),
        deviation in 0.005f64..0.2,
    ) {
        let vol = vec![0.5; closes.len()];
        let extrema = ExtremaExtractor::new(2, 1.0).unwrap().extract(&closes, &vol);
        let swings = SwingFilter::new(deviation).unwrap().filter(&extrema);

        prop_assert!(swings.len() <= extrema.len());
        prop_assert!(swings.iter().all(|s| extrema.contains(s)));
        prop_assert!(alternates(&swings));
        for w in swings.windows(2) {
            let moved = (w[1].price - w[0].price).abs();
            prop_assert!(moved >= deviation * w[0].price.abs() - 1e-9);
        }
    }

    #[test]
    fn collinear_points_fit_exactly(
        intercept in -1000.0f64..1000.0,
        slope in -5.0f64..5.0,
        indices in prop::collection::btree_set(0usize..500, 2..40),
    ) {
        let points: Vec<(usize, f64)> = indices
            .into_iter()
            .map(|i| (i, intercept + slope * i as f64))
            .collect();
        prop_assert_eq!(fit_line(&points).r_squared, 1.0);
    }

    #[test]
    fn overlap_resolution_keeps_disjoint_winners(
        spans in prop::collection::vec((0usize..200, 1usize..60, 0.0f64..1.0), 1..40),
        threshold in 0.0f64..1.0,
    ) {
        let types = [PatternType::Rectangle, PatternType::DoubleTop, PatternType::BullFlag];
        let patterns: Vec<ScoredPattern> = spans
            .iter()
            .enumerate()
            .map(|(i, &(start, len, conf))| scored(start, len, conf, types[i % types.len()]))
            .collect();
        let best = patterns.iter().map(|p| p.confidence).fold(f64::MIN, f64::max);

        let kept = OverlapResolver::new(threshold).resolve(patterns);
        prop_assert!(kept.iter().any(|p| p.confidence == best));
        for (i, a) in kept.iter().enumerate() {
            for b in &kept[i + 1..] {
                let iou = index_iou((a.start_index(), a.end_index()), (b.start_index(), b.end_index()));
                prop_assert!(iou <= threshold);
            }
            if let Some(next) = kept.get(i + 1) {
                prop_assert!(a.start_index() <= next.start_index());
            }
        }
    }

    #[test]
    fn confidence_stays_in_bounds(
        start in 20.0f64..500.0,
        steps in prop::collection::vec(-3.0f64..3.0, 20..400),
    ) {
        let bars = random_walk(start, &steps);
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        for p in engine.detect(&bars).unwrap() {
            prop_assert!((0.0..=0.99).contains(&p.confidence));
            prop_assert!((0.0..=1.0).contains(&p.quality_score));
            prop_assert!(p.start_index() <= p.end_index());
            prop_assert!(p.key_levels().is_finite());
            for line in &p.candidate.trendlines {
                prop_assert!(line.start_index < line.end_index);
                prop_assert!(line.start_index >= p.start_index());
                prop_assert!(line.end_index <= p.end_index());
            }
        }

        let multi = engine
            .detect_multi_timeframe(&[("1d", &bars[..]), ("4h", &bars[..]), ("1h", &bars[..])])
            .unwrap();
        for m in multi {
            prop_assert!(m.confidence >= m.base_confidence);
            prop_assert!(m.confidence <= 0.99);
            prop_assert!((0.0..=1.0).contains(&m.alignment_score));
            prop_assert_eq!(m.confirmation_level, m.detected_on_timeframes.len());
        }
    }

    #[test]
    fn detection_is_deterministic(
        start in 20.0f64..500.0,
        steps in prop::collection::vec(-3.0f64..3.0, 20..300),
    ) {
        let bars = random_walk(start, &steps);
        let first = EngineBuilder::new().with_all_defaults().build().unwrap();
        let second = EngineBuilder::new().with_all_defaults().build().unwrap();

        let a = serde_json::to_string(&first.detect(&bars).unwrap()).unwrap();
        let b = serde_json::to_string(&second.detect(&bars).unwrap()).unwrap();
        prop_assert_eq!(a, b);

        let inputs = [("1d", &bars[..]), ("4h", &bars[..])];
        let a = serde_json::to_string(&first.detect_multi_timeframe(&inputs).unwrap()).unwrap();
        let b = serde_json::to_string(&first.detect_multi_timeframe(&inputs).unwrap()).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn short_series_yield_nothing(
        steps in prop::collection::vec(-3.0f64..3.0, 0..20),
    ) {
        let bars = random_walk(100.0, &steps);
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        prop_assert!(engine.detect(&bars).unwrap().is_empty());
    }
}
