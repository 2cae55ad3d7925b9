//! Table output formatting using the `tabled` crate

use std::collections::BTreeMap;

use tabled::{builder::Builder, settings::style::Style};

/// Table output formatter
pub struct TableOutput;

impl TableOutput {
    /// Rows under a header, or `(no results)` when there are none.
    pub fn format_rows(headers: &[&str], rows: Vec<Vec<String>>) -> String {
        if rows.is_empty() {
            return "(no results)".to_string();
        }

        let mut builder = Builder::default();
        builder.push_record(headers.iter().copied());
        for row in rows {
            builder.push_record(row);
        }

        let mut table = builder.build();
        table.with(Style::rounded());
        table.to_string()
    }

    /// A two-column name/count histogram, largest first, with a total row.
    pub fn format_counts(label: &str, counts: &BTreeMap<String, usize>) -> String {
        let mut entries: Vec<(&String, &usize)> = counts.iter().collect();
        entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        let mut rows: Vec<Vec<String>> = entries
            .into_iter()
            .map(|(name, count)| vec![name.clone(), count.to_string()])
            .collect();
        if !rows.is_empty() {
            let total: usize = counts.values().sum();
            rows.push(vec!["total".to_string(), total.to_string()]);
        }

        Self::format_rows(&[label, "Count"], rows)
    }
}
