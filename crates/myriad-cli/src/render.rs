//! Plain-text tables for command output.

use colored::Colorize;
use myriad_model::{epoch, DimensionValues, Property};
use myriad_store::query::{DEPRECATED, ORDINAL, TIMESTAMP, USER_NAME, VALUE};
use myriad_store::{GetResult, Row};

/// Left-aligned columns separated by two spaces, bold header row.
pub fn table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let line = |cells: &[String]| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    out.push_str(&line(headers).bold().to_string());
    out.push('\n');
    for row in rows {
        out.push_str(&line(row));
        out.push('\n');
    }
    out
}

/// Render an epoch column as calendar time; anything unparsable is shown as is.
pub fn timestamp(raw: &str) -> String {
    match raw.parse::<i64>() {
        Ok(ts) if ts != epoch::UNSET => epoch::format(ts),
        Ok(_) => String::new(),
        Err(_) => raw.to_string(),
    }
}

pub fn metadata(dimensions: &[DimensionValues]) -> String {
    let headers = vec!["Dimension".to_string(), "Values".to_string()];
    let rows: Vec<Vec<String>> = dimensions
        .iter()
        .map(|d| vec![d.dimension.name().to_string(), d.values.join(", ")])
        .collect();
    table(&headers, &rows)
}

/// Query rows with a fixed column order: ordinal, key, one column per
/// dimension in `dimensions`, then the synthetic value columns.
pub fn rows(rows: &[Row], property_dimension: &str, dimensions: &[String]) -> String {
    let mut headers = vec![ORDINAL.to_string(), property_dimension.to_string()];
    headers.extend(
        dimensions
            .iter()
            .filter(|d| d.as_str() != property_dimension)
            .cloned(),
    );
    headers.extend([VALUE, USER_NAME, TIMESTAMP, DEPRECATED].map(String::from));

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            headers
                .iter()
                .map(|column| {
                    let raw = row.get(column).map(String::as_str).unwrap_or("");
                    if column == TIMESTAMP {
                        timestamp(raw)
                    } else {
                        raw.to_string()
                    }
                })
                .collect()
        })
        .collect();
    table(&headers, &cells)
}

pub fn get_result(result: &GetResult) -> String {
    let mut out = format!("{} {}\n", "context".cyan(), result.context);
    if result.properties.is_empty() {
        out.push_str("no matching properties\n");
        return out;
    }
    let headers = ["Name", "Value", "Deprecated"].map(String::from);
    let rows: Vec<Vec<String>> = result
        .properties
        .iter()
        .map(|p| vec![p.name.clone(), p.value.clone(), p.deprecated.to_string()])
        .collect();
    out.push_str(&table(&headers, &rows));
    out
}

pub fn property(property: &Property) -> String {
    let mut out = format!("{}", property.key.bold());
    if property.deprecated {
        out.push_str(&format!(" {}", "(deprecated)".red()));
    }
    out.push('\n');
    if !property.description.is_empty() {
        out.push_str(&format!("  {}\n", property.description));
    }
    out.push_str(&format!("  updated {}\n", epoch::format(property.timestamp)));

    let headers = ["Measures", "Value", "UserName", "Timestamp"].map(String::from);
    let rows: Vec<Vec<String>> = property
        .clusters
        .iter()
        .map(|c| {
            vec![
                c.measures.to_string(),
                c.value.clone(),
                c.user_name.clone(),
                epoch::format(c.timestamp),
            ]
        })
        .collect();
    out.push_str(&table(&headers, &rows));
    out
}
