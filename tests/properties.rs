mod common;
use crate::common::ConfigFileBuilder;

use std::time::Duration;

use proptest::prelude::*;
use tokio::sync::watch;

use taskstream::exec::rewrite_script;
use taskstream::logs::{log_channel, LogStreamer};
use taskstream::types::TaskState;

const ACTIVATE: &str = "mamba activate abc_runtime";

// Script lines drawn from a small vocabulary so that setup, postfix,
// activation and discard lines all show up often.
fn script_line() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(ACTIVATE.to_string()),
        Just("eval \"$(conda shell.bash hook)\"".to_string()),
        Just("source setup.sh".to_string()),
        Just("echo done".to_string()),
        Just(String::new()),
        "[a-z ]{1,12}".prop_map(|s| format!("echo {s}")),
    ]
}

proptest! {
    #[test]
    fn rewrite_is_idempotent(lines in proptest::collection::vec(script_line(), 0..20)) {
        let cfg = ConfigFileBuilder::new()
            .setup_command("source setup.sh")
            .setup_command(ACTIVATE)
            .postfix_command("echo done")
            .executor();

        let script = lines.join("\n");
        let once = rewrite_script(&script, &cfg);
        let twice = rewrite_script(&once, &cfg);

        prop_assert_eq!(&once, &twice);
        prop_assert_eq!(once.matches(ACTIVATE).count(), 1);
        prop_assert!(once.ends_with('\n') && !once.ends_with("\n\n"));
    }

    #[test]
    fn snapshots_preserve_publish_order(
        texts in proptest::collection::vec("[a-z0-9]{1,8}", 1..60),
        history in 5usize..30,
    ) {
        let display = history.min(10);
        let config = ConfigFileBuilder::new().history(history, display).stream();

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        let last = rt.block_on(async {
            let (sink, rx) = log_channel();
            let (state_tx, state_rx) = watch::channel(TaskState::Running);
            let mut logs = LogStreamer::new(rx, state_rx, config);

            for t in &texts {
                sink.publish(t.clone());
            }
            state_tx.send_replace(TaskState::Completed);
            drop(sink);

            logs.next_snapshot().await.unwrap()
        });

        let shown = texts.len().min(display);
        let expected: Vec<&str> = texts[texts.len() - shown..].iter().map(String::as_str).collect();
        prop_assert_eq!(last.texts(), expected);
        prop_assert_eq!(last.truncated_count, (texts.len() - shown) as u64);
    }

    #[test]
    fn successive_snapshots_never_reorder_lines(
        batches in proptest::collection::vec(1usize..8, 1..12),
        history in 5usize..30,
    ) {
        let display = history.min(10);
        let debounce = Duration::from_millis(100);
        let config = ConfigFileBuilder::new()
            .history(history, display)
            .debounce(debounce)
            .stream();

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        let snapshots: Vec<Vec<usize>> = rt.block_on(async {
            let (sink, rx) = log_channel();
            let (state_tx, state_rx) = watch::channel(TaskState::Running);
            let mut logs = LogStreamer::new(rx, state_rx, config);
            let mut seen = Vec::new();
            let mut next = 0usize;

            for size in &batches {
                for _ in 0..*size {
                    sink.publish(format!("r{next}"));
                    next += 1;
                }
                tokio::time::advance(debounce + Duration::from_millis(1)).await;
                seen.push(logs.next_snapshot().await.unwrap());
            }
            state_tx.send_replace(TaskState::Completed);
            drop(sink);
            seen.push(logs.next_snapshot().await.unwrap());

            seen.iter()
                .map(|snap| {
                    snap.texts()
                        .iter()
                        .map(|t| t.trim_start_matches('r').parse::<usize>().unwrap())
                        .collect::<Vec<_>>()
                })
                .collect()
        });

        let total: usize = batches.iter().sum();
        for snap in &snapshots {
            prop_assert!(snap.windows(2).all(|w| w[0] < w[1]), "out of order: {:?}", snap);
        }
        for pair in snapshots.windows(2) {
            let (earlier, later) = (&pair[0], &pair[1]);
            let common: Vec<usize> = earlier.iter().copied().filter(|i| later.contains(i)).collect();
            let common_in_later: Vec<usize> = later.iter().copied().filter(|i| earlier.contains(i)).collect();
            prop_assert_eq!(&common, &common_in_later);
            if let (Some(a), Some(b)) = (earlier.first(), later.first()) {
                prop_assert!(a <= b, "window moved backwards: {:?} then {:?}", earlier, later);
            }
        }
        prop_assert_eq!(snapshots.last().unwrap().last().copied(), Some(total - 1));
    }
}
