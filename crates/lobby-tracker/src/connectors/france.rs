//! France: HATVP register of interest representatives.
//!
//! HATVP publishes its whole register as a ZIP of `;`-separated CSV views.
//! The archive is cached and the views are joined per search:
//! organisation → yearly exercises → activities → officials and decisions.

use super::{best_match, field, missing, read_csv_rows, tag_matched_term, Connector};
use crate::cache::ResponseCache;
use crate::config::Endpoints;
use crate::error::{ConnectorError, ConnectorResult};
use crate::http_client::HttpClient;
use crate::query::SearchQuery;
use crate::registry::JurisdictionId;
use crate::types::{EntityType, Record};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::Duration;

type Row = BTreeMap<String, String>;

const INFO_VIEW: &str = "1_informations_generales.csv";
const EXERCISES_VIEW: &str = "15_exercices.csv";
const ACTIVITIES_VIEW: &str = "8_objets_activites.csv";
const OFFICIALS_VIEW: &str = "13_ministeres_aai_api.csv";
const DECISIONS_VIEW: &str = "12_decisions_concernees.csv";

pub struct FranceConnector {
    http: HttpClient,
    bundle_url: String,
    bundle: ResponseCache<(), Arc<Vec<u8>>>,
}

impl FranceConnector {
    pub fn new(http: HttpClient, endpoints: &Endpoints, ttl: Duration) -> Self {
        Self {
            http,
            bundle_url: endpoints.hatvp_zip.clone(),
            bundle: ResponseCache::new(ttl),
        }
    }

    async fn bundle(&self) -> ConnectorResult<Arc<Vec<u8>>> {
        let lookup = self
            .bundle
            .get_or_try_fetch((), || async {
                let bytes = self.http.get_bytes(&self.bundle_url).await?;
                tracing::info!(bytes = bytes.len(), "HATVP bundle downloaded");
                Ok::<_, ConnectorError>(Arc::new(bytes))
            })
            .await?;
        Ok(lookup.value)
    }
}

#[async_trait]
impl Connector for FranceConnector {
    fn jurisdiction(&self) -> JurisdictionId {
        JurisdictionId::France
    }

    async fn search(&self, query: &SearchQuery) -> ConnectorResult<Vec<Record>> {
        let bundle = self.bundle().await?;
        let query = query.clone();
        tokio::task::spawn_blocking(move || search_bundle(&bundle, &query)).await?
    }
}

/// Search an in-memory HATVP bundle.
pub fn search_bundle(bundle: &[u8], query: &SearchQuery) -> ConnectorResult<Vec<Record>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bundle))?;
    let organisations = read_view(&mut archive, INFO_VIEW)?;

    let alternatives = query.alternatives();
    let fanned_out = alternatives.len() > 1;
    let mut selected: Vec<(&Row, &SearchQuery)> = Vec::new();
    let mut seen = HashSet::new();
    for alt in &alternatives {
        let candidates: Vec<&Row> = organisations
            .iter()
            .filter(|row| alt.matches(field(row, "denomination")))
            .collect();
        if let Some(best) = best_match(&candidates, alt, |row| vec![field(row, "denomination")]) {
            if seen.insert(field(best, "representants_id").to_string()) {
                selected.push((*best, alt));
            }
        }
    }
    if selected.is_empty() {
        return Ok(Vec::new());
    }

    let org_ids: HashSet<&str> = selected
        .iter()
        .map(|(row, _)| field(row, "representants_id"))
        .collect();
    let exercises: Vec<Row> = read_view(&mut archive, EXERCISES_VIEW)?
        .into_iter()
        .filter(|row| org_ids.contains(field(row, "representants_id")))
        .collect();
    let exercise_ids: HashSet<&str> = exercises
        .iter()
        .map(|row| field(row, "exercices_id"))
        .collect();
    let activities: Vec<Row> = read_view(&mut archive, ACTIVITIES_VIEW)?
        .into_iter()
        .filter(|row| exercise_ids.contains(field(row, "exercices_id")))
        .collect();
    let activity_ids: HashSet<&str> = activities
        .iter()
        .map(|row| field(row, "activite_id"))
        .collect();
    let officials = count_by_action(read_view(&mut archive, OFFICIALS_VIEW)?, &activity_ids);
    let decisions = count_by_action(read_view(&mut archive, DECISIONS_VIEW)?, &activity_ids);

    let records = selected
        .into_iter()
        .map(|(org, alt)| {
            let id = field(org, "representants_id");
            let org_exercises: Vec<&Row> = exercises
                .iter()
                .filter(|e| field(e, "representants_id") == id)
                .collect();
            let own_exercise_ids: HashSet<&str> =
                org_exercises.iter().map(|e| field(e, "exercices_id")).collect();
            let org_activities: Vec<&Row> = activities
                .iter()
                .filter(|a| own_exercise_ids.contains(field(a, "exercices_id")))
                .collect();
            let own_activity_ids: HashSet<&str> =
                org_activities.iter().map(|a| field(a, "activite_id")).collect();

            let mut record = build_record(org, &org_exercises, &org_activities);
            record.set_raw("officials_targeted", officials.count_for(&own_activity_ids).to_string());
            record.set_raw("decisions_targeted", decisions.count_for(&own_activity_ids).to_string());
            tag_matched_term(&mut record, alt, fanned_out);
            record
        })
        .collect();
    Ok(records)
}

fn build_record(org: &Row, exercises: &[&Row], activities: &[&Row]) -> Record {
    let category = field(org, "label_categorie_organisation");
    let mut record =
        Record::new(JurisdictionId::France, field(org, "denomination")).with_type(entity_type(category));

    let mut by_year: Vec<&&Row> = exercises.iter().collect();
    by_year.sort_by(|a, b| field(b, "annee_debut").cmp(field(a, "annee_debut")));
    let latest_declared = by_year
        .iter()
        .find(|e| !field(e, "montant_depense").is_empty());
    if let Some(latest) = latest_declared {
        record.financial_range = Some(field(latest, "montant_depense").to_string());
        record.set_raw("financial_year", field(latest, "annee_debut"));
        record.set_raw("staff", field(latest, "nombre_salaries"));
    }

    let mut sorted_activities: Vec<&&Row> = activities.iter().collect();
    sorted_activities.sort_by(|a, b| {
        field(b, "date_publication_activite").cmp(field(a, "date_publication_activite"))
    });
    record.activities = sorted_activities
        .iter()
        .map(|a| field(a, "objet_activite"))
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    let active_years = exercises
        .iter()
        .filter(|e| !matches!(field(e, "nombre_activites"), "" | "0"))
        .count();

    record.set_raw("hatvp_id", field(org, "representants_id"));
    record.set_raw("siren", field(org, "identifiant_national"));
    record.set_raw("city", field(org, "ville"));
    record.set_raw("category", category);
    record.set_raw("activity_count", activities.len().to_string());
    record.set_raw("years_with_activity", active_years.to_string());
    record.set_raw("data_coverage", JurisdictionId::France.info().coverage);
    record
}

/// Consultancies and law firms lobby on behalf of clients.
fn entity_type(category: &str) -> EntityType {
    let lower = category.to_lowercase();
    if lower.contains("conseil") || lower.contains("cabinet") || lower.contains("avocat") {
        EntityType::Firm
    } else {
        EntityType::Company
    }
}

struct ActionCounts(BTreeMap<String, usize>);

impl ActionCounts {
    fn count_for(&self, ids: &HashSet<&str>) -> usize {
        ids.iter().filter_map(|id| self.0.get(*id)).sum()
    }
}

fn count_by_action(rows: Vec<Row>, activity_ids: &HashSet<&str>) -> ActionCounts {
    let mut counts = BTreeMap::new();
    for row in rows {
        let id = field(&row, "action_representation_interet_id");
        if activity_ids.contains(id) {
            *counts.entry(id.to_string()).or_insert(0) += 1;
        }
    }
    ActionCounts(counts)
}

/// Read one CSV view from the archive, matched by file-name suffix.
fn read_view<R: Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    view: &str,
) -> ConnectorResult<Vec<Row>> {
    let name = archive
        .file_names()
        .find(|n| n.ends_with(view))
        .map(String::from)
        .ok_or_else(|| missing(view))?;
    let mut bytes = Vec::new();
    archive.by_name(&name)?.read_to_end(&mut bytes).map_err(|e| {
        ConnectorError::parse(format!("reading {view}: {e}"))
    })?;
    read_csv_rows(&String::from_utf8_lossy(&bytes), b';')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    /// Minimal HATVP bundle with two organisations.
    fn sample_bundle() -> Vec<u8> {
        let files = [
            (
                INFO_VIEW,
                "denomination;representants_id;identifiant_national;ville;label_categorie_organisation\n\
                 TotalEnergies SE;101;542051180;Courbevoie;Société commerciale et civile\n\
                 Conseil Total Affaires;202;123456789;Paris;Société de conseil\n",
            ),
            (
                EXERCISES_VIEW,
                "representants_id;exercices_id;annee_debut;montant_depense;nombre_salaries;nombre_activites\n\
                 101;e1;2022;>= 1 000 000 € et < 1 250 000 €;12;30\n\
                 101;e2;2023;;;0\n\
                 202;e3;2023;< 10 000 €;1;1\n",
            ),
            (
                ACTIVITIES_VIEW,
                "exercices_id;activite_id;objet_activite;date_publication_activite;identifiant_fiche\n\
                 e1;a1;Energy transition bill;2023-03-01;F1\n\
                 e1;a2;Carbon tax;2023-05-01;F2\n\
                 e3;a3;Advice;2024-01-01;F3\n",
            ),
            (
                OFFICIALS_VIEW,
                "action_representation_interet_id;responsable_public;departement_ministeriel\n\
                 a1;Minister;Energy\n\
                 a2;Deputy;Parliament\n\
                 a2;Senator;Senate\n",
            ),
            (
                DECISIONS_VIEW,
                "action_representation_interet_id;decision_concernee\n\
                 a1;Loi climat\n",
            ),
        ];

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in files {
            writer
                .start_file(format!("Vues_Separees/{name}"), SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_search_bundle_joins_views() {
        let bundle = sample_bundle();
        let records = search_bundle(&bundle, &SearchQuery::parse("totalenergies")).unwrap();
        assert_eq!(records.len(), 1);

        let r = &records[0];
        assert_eq!(r.entity_name, "TotalEnergies SE");
        assert_eq!(r.entity_type, Some(EntityType::Company));
        assert_eq!(r.financial_range.as_deref(), Some(">= 1 000 000 € et < 1 250 000 €"));
        assert_eq!(r.activities, vec!["Carbon tax", "Energy transition bill"]);
        assert_eq!(r.raw["officials_targeted"], "3");
        assert_eq!(r.raw["decisions_targeted"], "1");
        assert_eq!(r.raw["years_with_activity"], "1");
        assert_eq!(r.raw["siren"], "542051180");
    }

    #[test]
    fn test_or_query_fans_out() {
        let bundle = sample_bundle();
        let records = search_bundle(&bundle, &SearchQuery::parse("TotalEnergies OR Conseil")).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].entity_type, Some(EntityType::Firm));
        assert_eq!(records[1].raw["matched_term"], "Conseil");
    }

    #[test]
    fn test_no_match_is_empty() {
        let bundle = sample_bundle();
        assert!(search_bundle(&bundle, &SearchQuery::parse("nestle")).unwrap().is_empty());
    }

    #[test]
    fn test_missing_view_is_parse_error() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("other.csv", SimpleFileOptions::default()).unwrap();
        let bytes = writer.finish().unwrap().into_inner();
        let err = search_bundle(&bytes, &SearchQuery::parse("x")).unwrap_err();
        assert!(matches!(err, ConnectorError::Parse(_)));
    }
}
