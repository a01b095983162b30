use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_BORDERS_ONLY,
};

use crate::report::ScanReport;

/// Deeper oversold rows render brighter: 1.0 at RSI 0, 0.4 at the threshold.
fn get_visibility_ratio(rsi: f64, threshold: f64) -> f64 {
    if threshold <= 0.0 {
        return 1.0;
    }
    (0.4 + 0.6 * (1.0 - rsi / threshold)).clamp(0.4, 1.0)
}

fn format_price(price: Option<f64>) -> String {
    price.map_or_else(|| "N/A".to_string(), |p| format!("{:.2}", p))
}

pub fn title(report: &ScanReport) -> String {
    format!("RSI < {} ({})", report.threshold, report.interval.label())
}

/// One report as a ranked table, with its title and a scan caption.
pub fn render_report(report: &ScanReport) -> String {
    let caption = format!(
        "Checked {} tickers, {} evaluated. Last scanned at {}",
        report.attempted,
        report.succeeded,
        report.completed_at_display()
    );

    if report.results.is_empty() {
        return format!("\n{}\nNo tickers found\n{}", title(report), caption);
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Rank").add_attribute(Attribute::Bold),
            Cell::new("Ticker").add_attribute(Attribute::Bold),
            Cell::new("Price")
                .add_attribute(Attribute::Bold)
                .set_alignment(CellAlignment::Right),
            Cell::new("RSI")
                .add_attribute(Attribute::Bold)
                .set_alignment(CellAlignment::Right),
        ]);

    for (rank, result) in report.results.iter().enumerate() {
        let ratio = get_visibility_ratio(result.rsi, report.threshold);
        let red_val = (255.0 * ratio) as u8;
        let cyan_val = (255.0 * ratio) as u8;

        table.add_row(vec![
            Cell::new(rank + 1).fg(Color::DarkGrey),
            Cell::new(result.ticker.as_str()).fg(Color::Rgb {
                r: 0,
                g: cyan_val,
                b: cyan_val,
            }),
            Cell::new(format_price(result.price)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}", result.rsi))
                .fg(Color::Rgb { r: red_val, g: 0, b: 0 })
                .set_alignment(CellAlignment::Right),
        ]);
    }

    format!("\n{}\n{}\n{}", title(report), table, caption)
}

pub fn render_reports(reports: &[ScanReport]) -> String {
    reports.iter().map(render_report).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{Interval, TickerSymbol};
    use crate::report::{Aggregator, ScanResult};

    #[test]
    fn empty_report_says_so() {
        let report = Aggregator::new(Interval::OneMinute, 30.0).finish();
        let text = render_report(&report);
        assert!(text.contains("RSI < 30 (1-minute)"));
        assert!(text.contains("No tickers found"));
        assert!(text.contains("Last scanned at"));
    }

    #[test]
    fn rows_follow_report_order() {
        let mut aggregator = Aggregator::new(Interval::FiveMinutes, 30.0);
        aggregator.record_attempt(true);
        aggregator.record_attempt(true);
        aggregator.push(ScanResult {
            ticker: TickerSymbol::parse("LOW").unwrap(),
            price: Some(12.5),
            rsi: 21.37,
        });
        aggregator.push(ScanResult {
            ticker: TickerSymbol::parse("LOWER").unwrap(),
            price: None,
            rsi: 8.1,
        });
        let text = render_report(&aggregator.finish());

        let deeper = text.find("8.10").unwrap();
        let shallower = text.find("21.37").unwrap();
        assert!(deeper < shallower);
        assert!(text.contains("N/A"));
        assert!(text.contains("Checked 2 tickers, 2 evaluated"));
    }

    #[test]
    fn visibility_ratio_bounds() {
        assert_eq!(get_visibility_ratio(0.0, 30.0), 1.0);
        assert_eq!(get_visibility_ratio(30.0, 30.0), 0.4);
        assert_eq!(get_visibility_ratio(45.0, 30.0), 0.4);
    }
}
