// pipeline_test.rs
//
// End-to-end pass over a small fixture population: raw documents → flatten →
// snapshot (records + context built together) → aggregation views → what-if score.

use attriml::cache_utils::{population_fingerprint, PopulationSnapshot};
use attriml::dashboard_utils::{assemble_views, ViewState};
use attriml::encode_utils::{build_context, encode};
use attriml::flatten_utils::flatten_raw_documents;
use attriml::model_utils::{
    score_what_if, DropoutClassifier, ModelError, ModelMetadata, WhatIfRecord,
};
use attriml::stats_utils::RecordFilter;
use async_trait::async_trait;
use serde_json::{json, Value};

fn fixture_documents() -> Vec<Value> {
    vec![
        json!({
            "_id": {"$oid": "64f000000000000000000001"},
            "datos_personales": {"edad": 18, "genero": "F", "estrato": 2, "discapacidad": 0},
            "academico": {"programa": "Ingenieria de Sistemas", "semestre_actual": 3},
            "location": {"ciudad": "Barranquilla", "departamento": "Atlantico",
                         "pais": "Colombia", "es_barranquilla": 1, "es_colombia": 1},
            "ICFES": {"matematicas": 70, "lectura_critica": 64, "ciencias": 68,
                      "sociales": 60, "ingles": 75, "total": 337},
            "metricas_rendimiento": {
                "promedio_acumulado": 4.2, "materias_cursadas_total": 18,
                "materias_perdidas_total": 1, "materias_repetidas": 0,
                "perdidas_por_departamento": {"A": 1}
            },
            "estado": {"becado": "Institucional", "graduado": 0, "desertor": 0},
            "periodo_info": {"ultimo_periodo": 202410}
        }),
        json!({
            "_id": {"$oid": "64f000000000000000000002"},
            "datos_personales": {"edad": 23, "genero": "M", "estrato": 1},
            "academico": {"programa": "Derecho", "segundo_programa": "Ninguno",
                          "semestre_actual": 7},
            "location": {"ciudad": "Soledad", "departamento": "Atlantico",
                         "pais": "Colombia", "es_barranquilla": 0, "es_colombia": 1},
            "metricas_rendimiento": {
                "promedio_acumulado": 2.8, "materias_cursadas_total": 40,
                "materias_perdidas_total": 9, "materias_repetidas": 4,
                "perdidas_por_departamento": {"A": 5, "B": 4}
            },
            "estado": {"desertor": 1},
            "periodo_info": {"ultimo_periodo": 202430}
        }),
        json!({
            "_id": "est-0003",
            "datos_personales": {"edad": 20, "genero": "F", "estrato": 3},
            "academico": {"programa": "Derecho", "segundo_programa": "Economia",
                          "semestre_actual": 5},
            "location": {"ciudad": "Quito", "pais": "Ecuador",
                         "es_barranquilla": 0, "es_colombia": 0},
            "metricas_rendimiento": {"promedio_acumulado": 3.6},
            "estado": {"desertor": 0},
            "periodo_info": {"ultimo_periodo": "202430"}
        }),
        // No usable identity: must be skipped, counted and reported.
        json!({
            "datos_personales": {"edad": 99},
            "estado": {"desertor": 1}
        }),
    ]
}

struct MidpointClassifier {
    metadata: ModelMetadata,
}

#[async_trait]
impl DropoutClassifier for MidpointClassifier {
    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    async fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
        assert_eq!(features.len(), self.metadata.expected_width);
        Ok(0.5)
    }
}

#[test]
fn flatten_reconciles_accepted_plus_rejected_with_input_count() {
    let documents = fixture_documents();
    let report = flatten_raw_documents(&documents);
    assert_eq!(report.records.len(), 3);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.input_count(), documents.len());
    assert_eq!(report.rejected[0].position, 3);
}

#[test]
fn snapshot_context_encodes_every_population_record_at_fixed_width() {
    let report = flatten_raw_documents(&fixture_documents());
    let fingerprint = population_fingerprint(4, Some("202430"));
    let snapshot = PopulationSnapshot::build(report, &fingerprint);

    assert_eq!(snapshot.context, build_context(&snapshot.records));
    // Departments in first-encountered order: doc 1 contributes A, doc 2 adds B.
    assert_eq!(snapshot.context.failure_departments(), ["A", "B"]);

    for record in &snapshot.records {
        let vector = encode(record, &snapshot.context).unwrap();
        assert_eq!(vector.values.len(), snapshot.context.expected_width());
        assert!(vector.values.iter().all(|v| v.is_finite()));
        assert!(vector.warnings.is_clean());
    }
}

#[test]
fn views_and_filters_work_off_the_same_snapshot() {
    let report = flatten_raw_documents(&fixture_documents());
    let snapshot = PopulationSnapshot::build(report, "4:202430");

    let filter = RecordFilter {
        periodos: vec!["202410".to_string(), "202430".to_string()],
        ..RecordFilter::default()
    };
    let data = assemble_views(&snapshot, &filter, ViewState::Ready(Vec::new()));

    let summary = data.summary.ready().unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.desertores, 1);
    assert_eq!(summary.becados, 1);

    let por_departamento = data.por_departamento.ready().unwrap();
    assert_eq!(por_departamento[0].label, "Atlantico");
    assert_eq!(por_departamento[0].total, 2);

    let internacional = data.internacional.ready().unwrap();
    assert_eq!(internacional.len(), 1);
    assert_eq!(internacional[0].label, "Ecuador");

    let distribucion = data.distribucion.ready().unwrap();
    assert_eq!(distribucion.total, 3);
    assert_eq!(distribucion.desertores, 1);
    assert_eq!(data.rejected_documents, 1);
}

#[tokio::test]
async fn what_if_scores_against_the_population_context() {
    let report = flatten_raw_documents(&fixture_documents());
    let snapshot = PopulationSnapshot::build(report, "4:202430");
    let model = MidpointClassifier {
        metadata: ModelMetadata {
            expected_width: snapshot.context.expected_width(),
            feature_names: snapshot.context.feature_names(),
            accuracy: 0.88,
            recall: 0.79,
            trained_on_fingerprint: Some(snapshot.fingerprint.clone()),
        },
    };

    let record = WhatIfRecord {
        edad: Some(21.0),
        genero: Some("M".to_string()),
        estrato: Some(2.0),
        programa: Some("Derecho".to_string()),
        semestre_actual: Some(6.0),
        promedio: Some(3.0),
        ciudad: Some("Barranquilla".to_string()),
        departamento: Some("Atlantico".to_string()),
        pais: Some("Colombia".to_string()),
        es_barranquilla: Some(1),
        es_colombia: Some(1),
        periodo: Some("202430".to_string()),
        ..WhatIfRecord::default()
    };

    let score = score_what_if(&record, &snapshot, &model).await.unwrap();
    assert_eq!(score.probability, 0.5);
    // Every submitted value exists in the reference population, so the encoding
    // raises no out-of-vocabulary warnings against the population context.
    assert!(score.warnings.unseen_values.is_empty());
    assert!(score.warnings.dropped_departments.is_empty());
}

#[tokio::test]
async fn what_if_with_unseen_program_gets_the_sentinel_but_still_scores() {
    let report = flatten_raw_documents(&fixture_documents());
    let snapshot = PopulationSnapshot::build(report, "4:202430");
    let model = MidpointClassifier {
        metadata: ModelMetadata {
            expected_width: snapshot.context.expected_width(),
            feature_names: snapshot.context.feature_names(),
            accuracy: 0.88,
            recall: 0.79,
            trained_on_fingerprint: None,
        },
    };

    let record = WhatIfRecord {
        edad: Some(19.0),
        genero: Some("F".to_string()),
        estrato: Some(4.0),
        programa: Some("Arquitectura".to_string()),
        semestre_actual: Some(1.0),
        promedio: Some(0.0),
        ..WhatIfRecord::default()
    };

    let score = score_what_if(&record, &snapshot, &model).await.unwrap();
    assert!(score
        .warnings
        .unseen_values
        .iter()
        .any(|(field, value)| field == "programa" && value == "Arquitectura"));
}
