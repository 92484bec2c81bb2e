//! Throttling behaviour against the real clock.

use std::thread;
use std::time::Duration;
use tracing_notifier::{
    FieldMask, LogRecord, RetentionPolicy, Signature, SignatureField, ThrottleSettings,
    ThrottlingEvaluator, TimeUnit,
};

fn evaluator(period_ms: u64, mask: FieldMask) -> ThrottlingEvaluator {
    ThrottlingEvaluator::with_settings(ThrottleSettings::new(
        RetentionPolicy::from_parts(period_ms, TimeUnit::Milliseconds).unwrap(),
        mask,
    ))
}

#[test]
fn test_once_per_window_with_real_clock() {
    let evaluator = evaluator(400, FieldMask::default());
    let record = LogRecord::new("ERROR", "billing::invoices", "invoice rejected").with_line(118);

    let first: Vec<bool> = (0..3).map(|_| evaluator.should_trigger(&record)).collect();
    assert_eq!(first, vec![true, false, false]);

    thread::sleep(Duration::from_millis(800));

    let second: Vec<bool> = (0..3).map(|_| evaluator.should_trigger(&record)).collect();
    assert_eq!(second, vec![true, false, false]);
}

#[test]
fn test_stack_trace_ignored_unless_masked() {
    let base = LogRecord::new("ERROR", "app::jobs", "job crashed").with_line(55);
    let a = base.clone().with_stack_trace(["Error: a", "caused by: x"]);
    let b = base.with_stack_trace(["Error: b", "caused by: y"]);

    let default_mask = evaluator(60_000, FieldMask::default());
    assert!(default_mask.should_trigger(&a));
    assert!(!default_mask.should_trigger(&b));

    let with_stack = evaluator(
        60_000,
        FieldMask::default().with(SignatureField::StackTrace),
    );
    assert!(with_stack.should_trigger(&a));
    assert!(with_stack.should_trigger(&b));
}

#[test]
fn test_signature_is_deterministic() {
    let record = LogRecord::new("WARN", "app::cache", "miss storm")
        .with_thread_name("tokio-runtime-worker")
        .with_file("src/cache.rs")
        .with_line(9);
    let mask = FieldMask::from_fields(SignatureField::ALL);

    let first = Signature::build(&record, mask);
    for _ in 0..10 {
        assert_eq!(Signature::build(&record, mask), first);
    }
}

#[test]
fn test_properties_drive_behaviour() {
    let evaluator =
        ThrottlingEvaluator::from_properties("period=200\nunit=MILLISECONDS\nmask=LEVEL");

    assert!(evaluator.should_trigger(&LogRecord::new("ERROR", "a", "1")));
    assert!(!evaluator.should_trigger(&LogRecord::new("ERROR", "b", "2")));
    assert!(evaluator.should_trigger(&LogRecord::new("WARN", "a", "1")));

    thread::sleep(Duration::from_millis(300));
    assert!(evaluator.should_trigger(&LogRecord::new("ERROR", "c", "3")));
}
