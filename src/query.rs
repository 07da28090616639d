//! Gmail search query for one year of internal threads

use crate::exclusions::ExclusionList;

/// Exclusion terms applied to every thread search
#[derive(Debug, Clone, Default)]
pub struct QueryExclusions {
    pub from: ExclusionList,
    pub to: ExclusionList,
    pub subjects: Vec<String>,
    /// Attachment extension to exclude; empty disables the term
    pub attachment_type: String,
}

/// Build the search query for threads within `home_domain` during `year`
///
/// Server-side filtering narrows the result set; every message is still
/// classified locally afterwards.
pub fn build_thread_query(year: i32, home_domain: &str, exclusions: &QueryExclusions) -> String {
    let mut terms = vec![
        format!("from:(*@{})", home_domain),
        format!("to:(*@{})", home_domain),
    ];

    for rule in exclusions.from.rules() {
        terms.push(format!("-from:({})", rule.query_operand()));
    }
    for rule in exclusions.to.rules() {
        terms.push(format!("-to:({})", rule.query_operand()));
    }
    for subject in &exclusions.subjects {
        let subject = subject.replace('"', "");
        let subject = subject.trim();
        if !subject.is_empty() {
            terms.push(format!("-subject:(\"{}\")", subject));
        }
    }

    let attachment_type = exclusions.attachment_type.trim();
    if !attachment_type.is_empty() {
        terms.push(format!("-filename:{}", attachment_type));
    }

    terms.push(format!("after:{}/01/01", year));
    terms.push(format!("before:{}/01/01", year + 1));

    terms.join(" ")
}
