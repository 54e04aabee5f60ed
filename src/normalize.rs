use scraper::Html;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One harvested job posting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub title: String,
    pub description: String,
    pub job_url: String,
    #[serde(rename = "datePosted")]
    pub date_posted: String,
    #[serde(rename = "validThrough")]
    pub valid_through: String,
    #[serde(rename = "occupationalCategory")]
    pub occupational_category: String,
    pub salary_min: f64,
    pub salary_max: f64,
    pub salary_currency: String,
    #[serde(rename = "companyName")]
    pub company_name: String,
    /// As given by the source: usually a string, sometimes a `PostalAddress`.
    #[serde(rename = "companyAddress")]
    pub company_address: Value,
}

impl JobRecord {
    pub const FIELDS: [&'static str; 11] = [
        "title",
        "description",
        "job_url",
        "datePosted",
        "validThrough",
        "occupationalCategory",
        "salary_min",
        "salary_max",
        "salary_currency",
        "companyName",
        "companyAddress",
    ];

    pub fn company_address_text(&self) -> String {
        match &self.company_address {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

// ── JSON-LD JobPosting shape ──

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobPosting {
    title: String,
    description: String,
    date_posted: String,
    valid_through: String,
    occupational_category: String,
    base_salary: BaseSalary,
    hiring_organization: HiringOrganization,
}

#[derive(Debug, Deserialize)]
struct BaseSalary {
    currency: String,
    value: SalaryRange,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SalaryRange {
    min_value: f64,
    max_value: f64,
}

#[derive(Debug, Deserialize)]
struct HiringOrganization {
    name: String,
    address: Value,
}

#[derive(Debug, Error)]
#[error("not a usable JobPosting: {0}")]
pub struct NormalizeError(#[from] serde_json::Error);

/// Parse repaired JSON-LD into a `JobRecord`. `source_url` always becomes
/// `job_url`; the payload's own `url` is ignored.
pub fn normalize(text: &str, source_url: &str) -> Result<JobRecord, NormalizeError> {
    let posting: JobPosting = serde_json::from_str(text)?;
    Ok(JobRecord {
        title: posting.title,
        description: clean_description(&posting.description),
        job_url: source_url.to_string(),
        date_posted: posting.date_posted,
        valid_through: posting.valid_through,
        occupational_category: posting.occupational_category,
        salary_min: posting.base_salary.value.min_value,
        salary_max: posting.base_salary.value.max_value,
        salary_currency: posting.base_salary.currency,
        company_name: posting.hiring_organization.name,
        company_address: posting.hiring_organization.address,
    })
}

/// Markup to plain text: trimmed text nodes joined by single spaces, then any
/// remaining entities decoded.
pub fn clean_description(markup: &str) -> String {
    let fragment = Html::parse_fragment(markup);
    let text = fragment
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    html_escape::decode_html_entities(&text).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://www.weworkremotely.com/remote-jobs/ferrous-labs-senior-rust-engineer";

    fn payload() -> Value {
        serde_json::json!({
            "@context": "http://schema.org",
            "@type": "JobPosting",
            "title": "Senior Rust Engineer",
            "description": "<p>Build <b>fast</b> things.</p><ul><li>Tokio</li><li>Serde</li></ul>",
            "datePosted": "2026-10-12T09:30:00Z",
            "validThrough": "2026-12-11T09:30:00Z",
            "occupationalCategory": "Back-End Programming",
            "url": "https://weworkremotely.com/somewhere-else",
            "baseSalary": {
                "@type": "MonetaryAmount",
                "currency": "USD",
                "value": { "@type": "QuantitativeValue", "minValue": 120000, "maxValue": 160000.5 }
            },
            "hiringOrganization": {
                "@type": "Organization",
                "name": "Ferrous Labs",
                "address": "Remote, Europe"
            }
        })
    }

    #[test]
    fn projects_nested_fields() {
        let r = normalize(&payload().to_string(), URL).unwrap();
        assert_eq!(r.title, "Senior Rust Engineer");
        assert_eq!(r.description, "Build fast things. Tokio Serde");
        assert_eq!(r.date_posted, "2026-10-12T09:30:00Z");
        assert_eq!(r.valid_through, "2026-12-11T09:30:00Z");
        assert_eq!(r.occupational_category, "Back-End Programming");
        assert_eq!(r.salary_min, 120000.0);
        assert_eq!(r.salary_max, 160000.5);
        assert_eq!(r.salary_currency, "USD");
        assert_eq!(r.company_name, "Ferrous Labs");
        assert_eq!(r.company_address_text(), "Remote, Europe");
    }

    #[test]
    fn job_url_comes_from_the_listing_reference() {
        let r = normalize(&payload().to_string(), URL).unwrap();
        assert_eq!(r.job_url, URL);
    }

    #[test]
    fn missing_base_salary_fails() {
        let mut p = payload();
        p.as_object_mut().unwrap().remove("baseSalary");
        let err = normalize(&p.to_string(), URL).unwrap_err();
        assert!(err.to_string().contains("baseSalary"), "{err}");
    }

    #[test]
    fn missing_nested_key_fails() {
        let mut p = payload();
        p["hiringOrganization"].as_object_mut().unwrap().remove("address");
        assert!(normalize(&p.to_string(), URL).is_err());

        let mut p = payload();
        p["baseSalary"]["value"].as_object_mut().unwrap().remove("maxValue");
        assert!(normalize(&p.to_string(), URL).is_err());
    }

    #[test]
    fn salary_type_mismatch_fails() {
        let mut p = payload();
        p["baseSalary"]["value"]["minValue"] = Value::from("120k");
        assert!(normalize(&p.to_string(), URL).is_err());
    }

    #[test]
    fn structured_address_kept_verbatim() {
        let mut p = payload();
        p["hiringOrganization"]["address"] = serde_json::json!({
            "@type": "PostalAddress",
            "addressCountry": "Anywhere in the World"
        });
        let r = normalize(&p.to_string(), URL).unwrap();
        assert_eq!(r.company_address["addressCountry"], "Anywhere in the World");
        assert!(r.company_address_text().contains("\"addressCountry\":\"Anywhere in the World\""));
    }

    #[test]
    fn invalid_json_fails() {
        assert!(normalize("{\"title\": ", URL).is_err());
    }

    #[test]
    fn serializes_with_source_field_names() {
        let r = normalize(&payload().to_string(), URL).unwrap();
        let v = serde_json::to_value(&r).unwrap();
        let keys: Vec<&str> = v.as_object().unwrap().keys().map(String::as_str).collect();
        for field in JobRecord::FIELDS {
            assert!(keys.contains(&field), "missing {field}");
        }
        assert_eq!(keys.len(), JobRecord::FIELDS.len());
    }

    #[test]
    fn clean_strips_tags_and_entities() {
        assert_eq!(
            clean_description("Great role<br>with \"quotes\" and a break"),
            "Great role with \"quotes\" and a break"
        );
        assert_eq!(clean_description("<p>R&amp;D &amp;amp; ops</p>"), "R&D & ops");
        assert_eq!(clean_description("<div>\n  <p> a </p>\n\n<p>b</p></div>"), "a b");
    }

    #[test]
    fn clean_is_idempotent_on_plain_text() {
        for text in ["Great role with \"quotes\" and a break", "a  b", "5 < 6 and 7 > 3", ""] {
            let once = clean_description(text);
            assert_eq!(once, text);
            assert_eq!(clean_description(&once), once);
        }
    }
}
