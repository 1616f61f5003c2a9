use crate::types::{IssueFinding, MergedReview, Priority};
use std::fmt::Write;

fn tier_marker(priority: Priority) -> &'static str {
    match priority {
        Priority::P0 => "🔴",
        Priority::P1 => "🟡",
        Priority::P2 => "🔵",
    }
}

/// Plain-text rendering of a merged review for the terminal
pub fn render_text(review: &MergedReview) -> String {
    let counts = review.priority_counts();
    let mut out = String::new();

    let _ = writeln!(out, "PR #{}: {}", review.pr_summary.number, review.pr_summary.title);
    let _ = writeln!(out, "===================");
    if !review.descriptions.is_empty() {
        let _ = writeln!(out, "\nSummaries:");
        for description in &review.descriptions {
            let _ = writeln!(out, "  - {}", description);
        }
    }

    let _ = writeln!(
        out,
        "\nIssues: {} total ({} P0, {} P1, {} P2)",
        counts.total(),
        counts.p0,
        counts.p1,
        counts.p2
    );

    for priority in Priority::ALL {
        if counts.get(priority) == 0 {
            continue;
        }
        let _ = writeln!(out, "\n{} {}", tier_marker(priority), priority.label());
        for issue in review.issues_with_priority(priority) {
            out.push_str(&render_issue_text(issue));
        }
    }

    out
}

fn render_issue_text(issue: &IssueFinding) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "  {}:{} [{}] ({})", issue.file, issue.line, issue.category, issue.agent);
    if !issue.description.is_empty() {
        let _ = writeln!(out, "    {}", issue.description);
    }
    if !issue.proposed_fix.is_empty() {
        let _ = writeln!(out, "    Fix: {}", issue.proposed_fix);
    }
    out
}

/// Markdown body for a line-anchored review comment
pub fn comment_body(issue: &IssueFinding) -> String {
    let mut body = format!(
        "{} **{}** · `{}`\n\n{}",
        tier_marker(issue.priority),
        issue.priority.label(),
        issue.category,
        issue.description
    );
    if !issue.proposed_fix.is_empty() {
        let _ = write!(body, "\n\n**Proposed fix:** {}", issue.proposed_fix);
    }
    let _ = write!(body, "\n\n<sub>Reported by {} via maxreview</sub>", issue.agent);
    body
}
