use bleach_core::BleachReport;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

/// Lay out `rows` under `headers` with two-space gutters. Columns listed in
/// `numeric` are right-aligned.
pub fn render_table(headers: &[&str], rows: &[Vec<String>], numeric: &[usize]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let line = |cells: Vec<&str>| -> String {
        let padded: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                if numeric.contains(&i) {
                    format!("{cell:>w$}")
                } else {
                    format!("{cell:<w$}")
                }
            })
            .collect();
        padded.join("  ").trim_end().to_string()
    };

    let mut out = String::new();
    out.push_str(&line(headers.to_vec()));
    out.push('\n');
    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    out.push_str(&sep.join("  "));
    out.push('\n');
    for row in rows {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out
}

pub fn print_report(report: &BleachReport) {
    let rows: Vec<Vec<String>> = report
        .operations
        .iter()
        .map(|op| {
            vec![
                op.operation.to_string(),
                op.acted.to_string(),
                op.archive
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "-".to_string()),
                op.error.clone().unwrap_or_else(|| "ok".to_string()),
            ]
        })
        .collect();

    let verb = if report.dry_run { "Would bleach" } else { "Bleached" };
    println!("{verb} @{} ({})", report.user.username, report.user.id);
    print!(
        "{}",
        render_table(&["OPERATION", "ACTED", "ARCHIVE", "STATUS"], &rows, &[1])
    );
    println!("total: {}", report.total_acted());
}
