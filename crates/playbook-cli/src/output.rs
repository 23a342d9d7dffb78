use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    if rows.is_empty() {
        println!("(none)");
        return;
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let line = |cells: Vec<String>| {
        let padded: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", c, width = w)
            })
            .collect();
        println!("{}", padded.join("  ").trim_end());
    };

    line(headers.iter().map(|h| h.to_string()).collect());
    line(widths.iter().map(|&w| "-".repeat(w)).collect());
    for row in rows {
        line(row);
    }
}

// ---------------------------------------------------------------------------
// Cell formatting
// ---------------------------------------------------------------------------

pub fn pct(value: f64) -> String {
    format!("{value:.1}%")
}

pub fn opt_pct(value: Option<f64>) -> String {
    value.map(pct).unwrap_or_else(|| "-".to_string())
}

/// Signed change, e.g. `+4.2%`.
pub fn trend(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:+.1}%"),
        None => "-".to_string(),
    }
}

pub fn number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_percentages() {
        assert_eq!(pct(26.14), "26.1%");
        assert_eq!(opt_pct(None), "-");
        assert_eq!(trend(Some(4.26)), "+4.3%");
        assert_eq!(trend(Some(-31.66)), "-31.7%");
    }

    #[test]
    fn formats_numbers() {
        assert_eq!(number(127.0), "127");
        assert_eq!(number(1.2345), "1.23");
    }
}
