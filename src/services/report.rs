use crate::models::{AvastReport, ScanResults};

/// Minimal GitHub-flavoured markdown table
pub struct MarkdownTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl MarkdownTable {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn add_row<I, S>(&mut self, row: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&Self::line(&self.headers));
        out.push_str(&Self::line(
            &self.headers.iter().map(|_| "-".to_string()).collect::<Vec<_>>(),
        ));
        for row in &self.rows {
            out.push_str(&Self::line(row));
        }
        out
    }

    fn line(cells: &[String]) -> String {
        // Pipes inside a cell would split it into two columns.
        let cells: Vec<String> = cells.iter().map(|c| c.replace('|', "\\|")).collect();
        format!("| {} |\n", cells.join(" | "))
    }
}

/// Render a verdict as the plugin's markdown section
pub fn markdown_table(results: &ScanResults) -> String {
    let mut table = MarkdownTable::new(["Infected", "Result", "Engine", "Database", "Updated"]);
    table.add_row([
        results.infected.to_string(),
        results.signature_match.clone(),
        results.engine.clone(),
        results.database.clone(),
        results.updated.trim().to_string(),
    ]);
    format!("#### Avast\n{}", table.render())
}

/// Serialize the `{"avast": {...}}` envelope with markdown stripped
pub fn to_json(results: &ScanResults) -> serde_json::Result<String> {
    let mut results = results.clone();
    results.markdown.clear();
    serde_json::to_string(&AvastReport::new(results))
}
