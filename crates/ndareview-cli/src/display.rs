//! Terminal rendering for documents, reviews, and feedback.

use ndareview_ai::{FeedbackOutcome, ReviewOutcome, TrainingReport};
use ndareview_core::{Document, Feedback, ParagraphKind, ReviewRecord, Suggestion, Suggestions};
use ndareview_store::{FeedbackStats, SimilarDocument};

const MAX_TEXT: usize = 96;

fn short(text: &str) -> String {
    if text.chars().count() <= MAX_TEXT {
        text.to_string()
    } else {
        let cut: String = text.chars().take(MAX_TEXT - 3).collect();
        format!("{cut}...")
    }
}

fn print_field(name: &str, value: impl std::fmt::Display) {
    println!("  {:<26} {}", name, value);
}

fn print_suggestion(s: &Suggestion) {
    let flag = if s.needs_review { "REVIEW" } else { "ok" };
    let validation = s
        .validation
        .map(|v| format!("{v:.3}"))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "  [{:>3}] {:<6} conf {:.3}  valid {}",
        s.index + 1,
        flag,
        s.confidence,
        validation
    );
    println!("        - {}", short(&s.clause));
    println!("        + {}", short(&s.proposed));
    for note in &s.notes {
        println!("        > {}", short(note));
    }
}

fn print_suggestions(header: &str, suggestions: &Suggestions) {
    println!("{header} ({})", suggestions.len());
    if suggestions.is_empty() {
        println!("  (none)");
    }
    for s in suggestions.values() {
        print_suggestion(s);
    }
    println!();
}

pub fn print_review(outcome: &ReviewOutcome) {
    println!("=== Review {} ===", outcome.document_id);
    print_field("redline", &outcome.redline_id);
    print_field("findings", outcome.findings);
    print_field(
        "needs review",
        outcome.suggestions.values().filter(|s| s.needs_review).count(),
    );
    println!();
    print_suggestions("Suggestions", &outcome.suggestions);
}

pub fn print_feedback_outcome(outcome: &FeedbackOutcome) {
    let fb = &outcome.feedback;
    println!("=== Feedback on {} ===", fb.document_id);
    print_field("sentiment", format!("{:.3}", fb.sentiment));
    print_field(
        "redline",
        outcome.redline_id.as_deref().unwrap_or("(not analyzed yet)"),
    );
    println!("Key points");
    for point in &fb.key_points {
        println!("  - {point}");
    }
    println!();
    print_suggestions("Adjusted suggestions", &outcome.suggestions);
}

fn kind_marker(kind: ParagraphKind) -> &'static str {
    match kind {
        ParagraphKind::Original | ParagraphKind::Unchanged => " ",
        ParagraphKind::Removed => "-",
        ParagraphKind::Proposed => "+",
    }
}

pub fn print_document(document: &Document, review: Option<&ReviewRecord>, history: &[Feedback]) {
    println!("=== {} ===", document.id);
    print_field("paragraphs", document.len());
    print_field("removed", document.count_kind(ParagraphKind::Removed));
    print_field("proposed", document.count_kind(ParagraphKind::Proposed));
    println!();

    println!("Text");
    for (i, p) in document.paragraphs.iter().enumerate() {
        if p.is_blank() {
            continue;
        }
        println!("  {:>4} {} {}", i + 1, kind_marker(p.kind), short(&p.text));
    }
    println!();

    if let Some(record) = review {
        println!("Review");
        print_field("redline", &record.redline_id);
        print_field("findings", record.findings.len());
        println!();
        print_suggestions("Suggestions", &record.suggestions);
    }

    if !history.is_empty() {
        println!("Feedback ({})", history.len());
        for fb in history {
            println!(
                "  {}  {:.3}  {}",
                fb.timestamp.format("%Y-%m-%d %H:%M"),
                fb.sentiment,
                short(&fb.text)
            );
        }
        println!();
    }
}

pub fn print_stats(stats: &FeedbackStats) {
    println!("=== Feedback statistics ===");
    print_field("total", stats.total);
    print_field("average sentiment", format!("{:.3}", stats.average_sentiment));
    println!();
    println!("By month");
    for (month, count) in &stats.by_month {
        print_field(month, count);
    }
}

pub fn print_similar(results: &[SimilarDocument]) {
    if results.is_empty() {
        println!("No indexed documents.");
        return;
    }
    for r in results {
        println!("  {:.4}  {}", r.score, r.document_id);
    }
}

pub fn print_training(report: &TrainingReport) {
    println!("=== Training complete ===");
    print_field("model", report.model_dir.display());
    print_field("samples", report.num_samples);
    print_field("trained on", report.num_train);
    print_field("held out", report.evaluation.num_samples);
    print_field("correct", report.evaluation.correct_predictions);
    print_field("accuracy", format!("{:.3}", report.evaluation.accuracy));
}
