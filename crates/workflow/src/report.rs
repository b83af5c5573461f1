//! The Finish node's report formatter: a small, dependency-free
//! Markdown renderer over a finished `ResearchState`. Kept separate from
//! `nodes.rs` so it can be unit-tested without any capability doubles.

use fathom_domain::research::ResearchState;

pub fn render_report(state: &ResearchState) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Research report: {}\n\n", state.query));
    out.push_str(&format!(
        "_Iterations: {} / {} · Quality score: {:.2}_\n\n",
        state.iteration_count, state.max_iterations, state.quality_score
    ));

    if state.timed_out {
        out.push_str("> Research timed out before completing.\n\n");
    }

    out.push_str("## Summary\n\n");
    if state.findings.is_empty() {
        out.push_str("_No findings recorded._\n\n");
    } else {
        out.push_str(&state.findings);
        out.push_str("\n\n");
    }

    if !state.critique_notes.is_empty() {
        out.push_str("## Critique notes\n\n");
        for note in &state.critique_notes {
            out.push_str(&format!("- {note}\n"));
        }
        out.push('\n');
    }

    out.push_str("## Sources\n\n");
    if state.sources.is_empty() {
        out.push_str("_No sources recorded._\n");
    } else {
        for (i, source) in state.sources.iter().enumerate() {
            out.push_str(&format!("{}. [{}]({}) — {}\n", i + 1, source.title, source.url, source.snippet));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn renders_findings_and_sources_in_order() {
        let state = ResearchState::new(Uuid::new_v4(), "daily trends")
            .with_findings("AI adoption is accelerating.")
            .with_sources_appended(vec![
                fathom_domain::research::SourceReference {
                    url: "https://a.example".into(),
                    title: "A".into(),
                    snippet: "first".into(),
                    retrieved_at: chrono::Utc::now(),
                },
                fathom_domain::research::SourceReference {
                    url: "https://b.example".into(),
                    title: "B".into(),
                    snippet: "second".into(),
                    retrieved_at: chrono::Utc::now(),
                },
            ]);
        let rendered = render_report(&state);
        assert!(rendered.contains("AI adoption is accelerating."));
        let a_pos = rendered.find("A]").unwrap();
        let b_pos = rendered.find("B]").unwrap();
        assert!(a_pos < b_pos);
    }

    #[test]
    fn empty_state_still_renders_without_panicking() {
        let state = ResearchState::new(Uuid::new_v4(), "empty topic");
        let rendered = render_report(&state);
        assert!(rendered.contains("No findings recorded"));
        assert!(rendered.contains("No sources recorded"));
    }
}
