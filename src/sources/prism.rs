// src/sources/prism.rs
use once_cell::sync::Lazy;
use reqwest::header;
use scraper::{ElementRef, Html, Selector};

use crate::config::{Settings, PRISM_REGION_CODE, PRISM_REGION_LABEL};
use crate::extractors::number::parse_price;
use crate::sources::client::SourceClient;
use crate::sources::models::{semester_label, RiceAreaRecord, YieldRecord};
use crate::utils::error::SourceError;

const SEMESTERS: [u8; 2] = [1, 2];
const PRISM_ORIGIN: &str = "https://prism.philrice.gov.ph";
const PRISM_REFERER: &str = "https://prism.philrice.gov.ph/wp-dynamicreports/";

static ROW_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("#RA_table tbody tr").expect("Failed to compile ROW_SELECTOR")
});

static CELL_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("th, td").expect("Failed to compile CELL_SELECTOR")
});

fn cell_texts(row: ElementRef) -> Vec<String> {
    row.select(&CELL_SELECTOR)
        .map(|cell| cell.text().collect::<String>().trim().to_string())
        .collect()
}

/// Value in the second column of the report row labelled `target`.
pub fn table_value(html: &str, target: &str) -> Option<f64> {
    let document = Html::parse_document(html);
    document
        .select(&ROW_SELECTOR)
        .map(cell_texts)
        .filter(|cells| cells.len() >= 2)
        .find(|cells| cells[0] == target)
        .and_then(|cells| parse_price(Some(cells[1].as_str())))
}

/// Mean of the second column over all report rows.
/// A single non-numeric value voids the whole table.
pub fn second_column_mean(html: &str) -> Option<f64> {
    let document = Html::parse_document(html);
    let values: Vec<f64> = document
        .select(&ROW_SELECTOR)
        .map(cell_texts)
        .filter(|cells| cells.len() >= 2)
        .map(|cells| parse_price(Some(cells[1].as_str())))
        .collect::<Option<Vec<f64>>>()?;

    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

async fn post_report(
    client: &SourceClient,
    url: &str,
    year: i32,
    semester: u8,
    region: u32,
) -> Result<String, SourceError> {
    let form = [
        ("year", year.to_string()),
        ("sem", semester.to_string()),
        ("region", region.to_string()),
    ];

    let response = client.http()
        .post(url)
        .header(header::USER_AGENT, "Mozilla/5.0")
        .header("X-Requested-With", "XMLHttpRequest")
        .header(header::ORIGIN, PRISM_ORIGIN)
        .header(header::REFERER, PRISM_REFERER)
        .form(&form)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Http(status, url.to_string()));
    }
    Ok(response.text().await?)
}

/// Queries PRISM for every configured year and semester.
///
/// Requests run one after another; a failed or empty report is logged and
/// leaves a gap in the series. Results are sorted by (year, semester).
pub async fn collect_reports(
    client: &SourceClient,
    settings: &Settings,
) -> (Vec<RiceAreaRecord>, Vec<YieldRecord>) {
    let area_url = format!("{}RA", settings.prism_url);
    let yield_url = format!("{}yield_nodrill", settings.prism_url);

    let mut areas = Vec::new();
    let mut yields = Vec::new();
    let total = settings.prism_years.len() * SEMESTERS.len();
    let mut done = 0;

    for &year in &settings.prism_years {
        for semester in SEMESTERS {
            let label = semester_label(year, semester);

            // Rice area is only published in the all-regions table.
            match post_report(client, &area_url, year, semester, 0).await {
                Ok(html) => match table_value(&html, PRISM_REGION_LABEL) {
                    Some(rice_area_ha) => areas.push(RiceAreaRecord {
                        date: label.clone(),
                        year,
                        semester,
                        region: PRISM_REGION_LABEL.to_string(),
                        rice_area_ha,
                    }),
                    None => tracing::debug!("No rice area for {} in {}", PRISM_REGION_LABEL, label),
                },
                Err(e) => tracing::warn!("Rice area request for {} failed: {}", label, e),
            }

            match post_report(client, &yield_url, year, semester, PRISM_REGION_CODE).await {
                Ok(html) => match second_column_mean(&html) {
                    Some(avg_yield_ton_per_ha) => yields.push(YieldRecord {
                        date: label.clone(),
                        year,
                        semester,
                        region: PRISM_REGION_LABEL.to_string(),
                        avg_yield_ton_per_ha,
                    }),
                    None => tracing::debug!("No yield figures in {}", label),
                },
                Err(e) => tracing::warn!("Yield request for {} failed: {}", label, e),
            }

            done += 1;
            tracing::info!("PRISM {}/{} ({})", done, total, label);
        }
    }

    areas.sort_by_key(|r| (r.year, r.semester));
    yields.sort_by_key(|r| (r.year, r.semester));
    (areas, yields)
}

#[cfg(test)]
mod tests {
    use super::*;

    const AREA_HTML: &str = r#"
        <table id="RA_table">
          <thead><tr><th>Region</th><th>Area (ha)</th></tr></thead>
          <tbody>
            <tr><th>Region VI</th><td>350,000</td></tr>
            <tr><th> Region VII </th><td>62,418.5</td></tr>
            <tr><th>Region VIII</th><td>140,000</td></tr>
          </tbody>
        </table>
    "#;

    const YIELD_HTML: &str = r#"
        <table id="RA_table"><tbody>
          <tr><td>Bohol</td><td>3.5</td></tr>
          <tr><td>Cebu</td><td>2.5</td></tr>
          <tr><td>Negros Oriental</td><td>3.0</td></tr>
          <tr><td>footer</td></tr>
        </tbody></table>
    "#;

    #[test]
    fn test_table_value_finds_exact_label() {
        assert_eq!(table_value(AREA_HTML, "Region VII"), Some(62418.5));
        assert_eq!(table_value(AREA_HTML, "Region IX"), None);
    }

    #[test]
    fn test_table_value_ignores_other_tables() {
        let html = r#"<table id="other"><tbody><tr><td>Region VII</td><td>1</td></tr></tbody></table>"#;
        assert_eq!(table_value(html, "Region VII"), None);
    }

    #[test]
    fn test_second_column_mean() {
        assert_eq!(second_column_mean(YIELD_HTML), Some(3.0));
        assert_eq!(second_column_mean("<p>no data</p>"), None);
    }

    #[test]
    fn test_second_column_mean_rejects_non_numeric() {
        let html = r#"<table id="RA_table"><tbody>
            <tr><td>Bohol</td><td>3.5</td></tr>
            <tr><td>Cebu</td><td>n/a</td></tr>
        </tbody></table>"#;
        assert_eq!(second_column_mean(html), None);
    }
}
