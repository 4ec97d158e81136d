//! Catalonia: Registre de grups d'interès, via the Socrata open-data API.

use super::{format_eur, json_text, parse_amount, tag_matched_term, Connector};
use crate::config::Endpoints;
use crate::error::ConnectorResult;
use crate::http_client::HttpClient;
use crate::query::SearchQuery;
use crate::registry::JurisdictionId;
use crate::types::{EntityType, Record};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;

/// Maximum rows requested per search.
const ROW_LIMIT: u32 = 100;

pub struct CataloniaConnector {
    http: HttpClient,
    url: String,
}

impl CataloniaConnector {
    pub fn new(http: HttpClient, endpoints: &Endpoints) -> Self {
        Self {
            http,
            url: endpoints.catalonia.clone(),
        }
    }
}

/// SoQL filter for a case-insensitive name search.
pub fn where_clause(text: &str) -> String {
    let escaped = text.to_lowercase().replace('\'', "''");
    format!("lower(nom) like '%{escaped}%'")
}

#[async_trait]
impl Connector for CataloniaConnector {
    fn jurisdiction(&self) -> JurisdictionId {
        JurisdictionId::Catalonia
    }

    /// One `$where` request per `OR` alternative; rows found by several
    /// alternatives are kept once.
    async fn search(&self, query: &SearchQuery) -> ConnectorResult<Vec<Record>> {
        let alternatives = query.alternatives();
        let fanned_out = alternatives.len() > 1;
        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for alt in &alternatives {
            let params = [
                ("$where", where_clause(&alt.search_text())),
                ("$limit", ROW_LIMIT.to_string()),
            ];
            let rows: Vec<Value> = self.http.get_json(&self.url, &params).await?;
            for row in rows.iter().filter(|row| alt.matches(&json_text(row, "/nom"))) {
                let id = json_text(row, "/identificador");
                let key = if id.is_empty() { json_text(row, "/nom") } else { id };
                if !seen.insert(key) {
                    continue;
                }
                let mut record = to_record(row);
                tag_matched_term(&mut record, alt, fanned_out);
                records.push(record);
            }
        }
        Ok(records)
    }
}

/// Short category code: "Categoria II. Sector empresarial" → "II".
fn category_code(category: &str) -> &str {
    match category.strip_prefix("Categoria ") {
        Some(rest) => rest.split('.').next().unwrap_or(rest).trim(),
        None => category,
    }
}

pub fn to_record(row: &Value) -> Record {
    let category = json_text(row, "/categoria_registre");
    // Category I covers consultancies and advisory services.
    let entity_type = if category_code(&category) == "I" {
        EntityType::Firm
    } else {
        EntityType::Company
    };
    let mut record = Record::new(JurisdictionId::Catalonia, json_text(row, "/nom")).with_type(entity_type);

    record.financial_range = parse_amount(&json_text(row, "/volum_anual_negocis"))
        .filter(|v| *v > 0)
        .map(|v| format!("{} annual business volume", format_eur(v)));

    for key in ["/ambits_interes", "/propostes_normatives"] {
        let text = json_text(row, key);
        if !text.is_empty() {
            record.activities.push(text);
        }
    }

    let registered = json_text(row, "/data_alta");
    record.set_raw("register_id", json_text(row, "/identificador"));
    record.set_raw("registration_date", registered.get(..10).unwrap_or(registered.as_str()));
    record.set_raw("group_type", json_text(row, "/tipus_grup"));
    record.set_raw("category", category.as_str());
    record.set_raw("subcategory", json_text(row, "/subcategoria_registre"));
    record.set_raw("purpose", json_text(row, "/finalitat"));
    if let Some(budget) = parse_amount(&json_text(row, "/pressupost")).filter(|v| *v > 0) {
        record.set_raw("budget", format_eur(budget));
    }
    record.set_raw("public_funds", json_text(row, "/fons_p_blics"));
    record.set_raw("email", json_text(row, "/email"));
    record.set_raw("website", json_text(row, "/pagina_web"));
    record.set_raw("province", json_text(row, "/provincia"));
    record.set_raw("municipality", json_text(row, "/muni_esp"));
    record.set_raw("scope", json_text(row, "/ambits_registre"));
    record.set_raw("data_coverage", JurisdictionId::Catalonia.info().coverage);
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_where_clause_escapes_quotes() {
        assert_eq!(where_clause("L'Oréal"), "lower(nom) like '%l''oréal%'");
    }

    #[test]
    fn test_category_code() {
        assert_eq!(category_code("Categoria I. Consultories"), "I");
        assert_eq!(category_code("Categoria III. ONG"), "III");
        assert_eq!(category_code("Altres"), "Altres");
    }

    #[test]
    fn test_to_record() {
        let row = json!({
            "nom": "Consultora Exemple SL",
            "identificador": "1234",
            "data_alta": "2019-04-05T00:00:00.000",
            "categoria_registre": "Categoria I. Consultories professionals",
            "volum_anual_negocis": "250000.0",
            "pressupost": "0",
            "ambits_interes": "Energia; Medi ambient",
            "provincia": "Barcelona"
        });
        let r = to_record(&row);
        assert_eq!(r.entity_name, "Consultora Exemple SL");
        assert_eq!(r.entity_type, Some(EntityType::Firm));
        assert_eq!(
            r.financial_range.as_deref(),
            Some("\u{20AC}250,000 annual business volume")
        );
        assert_eq!(r.activities, vec!["Energia; Medi ambient"]);
        assert_eq!(r.raw["registration_date"], "2019-04-05");
        assert!(!r.raw.contains_key("budget"));
    }
}
