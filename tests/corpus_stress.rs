mod common;

use std::panic::{self, AssertUnwindSafe};

use attach_flow::{prepare, PrepareOptions, PLACEHOLDER_CLOSE, PLACEHOLDER_OPEN};
use common::fixtures::{ARTICLE, HOSTILE};

fn leaks_markers(text: &str) -> bool {
    text.chars().any(|ch| {
        ch == PLACEHOLDER_OPEN || ch == PLACEHOLDER_CLOSE || ('\u{E002}'..='\u{E005}').contains(&ch)
    })
}

#[test]
fn hostile_markup_prepares_without_panics() {
    let options = PrepareOptions::default();
    let mut failures = Vec::new();
    for (idx, markup) in HOSTILE.iter().chain(std::iter::once(&ARTICLE)).enumerate() {
        let run = panic::catch_unwind(AssertUnwindSafe(|| -> Result<(), String> {
            let prepared = prepare(markup, &options);
            if leaks_markers(prepared.text.text()) {
                return Err(format!("markers leaked: {:?}", prepared.text.text()));
            }
            if prepared.text.anchors().len() != prepared.attachments.len() {
                return Err(format!(
                    "{} anchors for {} attachments",
                    prepared.text.anchors().len(),
                    prepared.attachments.len()
                ));
            }
            Ok(())
        }));

        match run {
            Ok(Ok(())) => {}
            Ok(Err(err)) => failures.push(format!("#{idx} {markup:?} -> {err}")),
            Err(_) => failures.push(format!("#{idx} {markup:?} -> panic")),
        }
    }

    assert!(
        failures.is_empty(),
        "Stress failures ({}):\n{}",
        failures.len(),
        failures.join("\n")
    );
}
