// model_utils.rs
use crate::cache_utils::PopulationSnapshot;
use crate::encode_utils::{encode, EncodeError, EncodeWarnings, EncodingContext};
use crate::flatten_utils::{FlatRecord, NO_SCHOLARSHIP, NO_SECONDARY_PROGRAM};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

/// Metadata shipped alongside the pre-trained classifier artifact: the exact feature
/// width and order it was trained with, plus its reported performance. The width and
/// names are the contract every score request is checked against before predicting.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelMetadata {
    pub expected_width: usize,
    pub feature_names: Vec<String>,
    pub accuracy: f64,
    pub recall: f64,
    pub trained_on_fingerprint: Option<String>,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model metadata is unreadable: {0}")]
    Metadata(String),
    #[error("what-if record is missing the required field '{field}'")]
    MissingField { field: &'static str },
    #[error("feature width mismatch: model expects {expected}, context produces {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("feature name mismatch at column {position}: model expects '{expected}', context produces '{actual}'")]
    NameMismatch {
        position: usize,
        expected: String,
        actual: String,
    },
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("inference call failed: {0}")]
    Inference(String),
    #[error("classifier returned a probability outside [0, 1]: {0}")]
    InvalidProbability(f64),
}

impl ModelMetadata {
    pub fn from_json(raw: &str) -> Result<Self, ModelError> {
        serde_json::from_str(raw).map_err(|e| ModelError::Metadata(e.to_string()))
    }

    /// Verifies that an encoding context produces exactly the column set and order
    /// this model was trained with. A mismatch is fatal for the request; nothing is
    /// truncated, padded or reordered to make it fit.
    pub fn validate_against(&self, context: &EncodingContext) -> Result<(), ModelError> {
        let actual_width = context.expected_width();
        if self.expected_width != actual_width {
            return Err(ModelError::ShapeMismatch {
                expected: self.expected_width,
                actual: actual_width,
            });
        }
        for (position, (expected, actual)) in self
            .feature_names
            .iter()
            .zip(context.feature_names())
            .enumerate()
        {
            if *expected != actual {
                return Err(ModelError::NameMismatch {
                    position,
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(())
    }
}

/// The classifier boundary: a black box mapping a feature vector of the trained
/// width to a dropout probability.
#[async_trait]
pub trait DropoutClassifier: Send + Sync {
    fn metadata(&self) -> &ModelMetadata;
    async fn predict(&self, features: &[f64]) -> Result<f64, ModelError>;
}

/// A classifier served by a remote inference endpoint.
pub struct RemoteClassifier {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub metadata: ModelMetadata,
}

impl RemoteClassifier {
    pub fn new(endpoint: &str, api_key: Option<&str>, metadata: ModelMetadata) -> Self {
        RemoteClassifier {
            endpoint: endpoint.to_string(),
            api_key: api_key.map(str::to_string),
            metadata,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    probability: f64,
}

#[async_trait]
impl DropoutClassifier for RemoteClassifier {
    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    async fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
        let client = Client::new();
        let mut request = client
            .post(&self.endpoint)
            .json(&json!({"features": features}));
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ModelError::Inference(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ModelError::Inference(format!(
                "inference endpoint returned status {}",
                response.status()
            )));
        }
        let parsed: InferenceResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Inference(e.to_string()))?;
        if !(0.0..=1.0).contains(&parsed.probability) || parsed.probability.is_nan() {
            return Err(ModelError::InvalidProbability(parsed.probability));
        }
        Ok(parsed.probability)
    }
}

/// A hypothetical student as submitted through the what-if form. Fields the form
/// requires are plain `Option`s here and checked in [`WhatIfRecord::to_flat`];
/// everything else defaults exactly like the flattener defaults a stored document.
#[derive(Debug, Clone, Default)]
pub struct WhatIfRecord {
    pub edad: Option<f64>,
    pub genero: Option<String>,
    pub estrato: Option<f64>,
    pub programa: Option<String>,
    pub semestre_actual: Option<f64>,
    pub promedio: Option<f64>,
    pub segundo_programa: Option<String>,
    pub tipo_estudiante: Option<String>,
    pub tipo_admision: Option<String>,
    pub estado_academico: Option<String>,
    pub ciudad: Option<String>,
    pub departamento: Option<String>,
    pub pais: Option<String>,
    pub es_barranquilla: Option<i64>,
    pub es_colombia: Option<i64>,
    pub discapacidad: Option<i64>,
    pub tipo_colegio: Option<String>,
    pub calendario: Option<String>,
    pub icfes_matematicas: Option<f64>,
    pub icfes_lectura: Option<f64>,
    pub icfes_ciencias: Option<f64>,
    pub icfes_sociales: Option<f64>,
    pub icfes_ingles: Option<f64>,
    pub icfes_total: Option<f64>,
    pub materias_cursadas: Option<f64>,
    pub materias_perdidas: Option<f64>,
    pub materias_repetidas: Option<f64>,
    pub perdidas_por_departamento: BTreeMap<String, f64>,
    pub becado: Option<String>,
    pub periodo: Option<String>,
}

impl WhatIfRecord {
    /// Completes the form input into a full [`FlatRecord`]. The six fields the form
    /// must always provide fail loudly when absent; the rest take the documented
    /// flattener defaults.
    pub fn to_flat(&self) -> Result<FlatRecord, ModelError> {
        fn required<T: Copy>(value: Option<T>, field: &'static str) -> Result<T, ModelError> {
            value.ok_or(ModelError::MissingField { field })
        }

        let edad = required(self.edad, "edad")?;
        let estrato = required(self.estrato, "estrato")?;
        let semestre_actual = required(self.semestre_actual, "semestre_actual")?;
        let promedio = required(self.promedio, "promedio")?;
        let genero = self
            .genero
            .clone()
            .ok_or(ModelError::MissingField { field: "genero" })?;
        let programa = self
            .programa
            .clone()
            .ok_or(ModelError::MissingField { field: "programa" })?;

        let segundo_programa = self
            .segundo_programa
            .clone()
            .unwrap_or_else(|| NO_SECONDARY_PROGRAM.to_string());
        let tiene_segundo_programa = i64::from(
            !segundo_programa.is_empty() && segundo_programa != NO_SECONDARY_PROGRAM,
        );

        Ok(FlatRecord {
            id: format!("what-if-{}", Uuid::new_v4()),
            edad,
            genero,
            estrato,
            discapacidad: self.discapacidad.unwrap_or(0),
            programa,
            segundo_programa,
            tiene_segundo_programa,
            semestre_actual,
            tipo_estudiante: self.tipo_estudiante.clone().unwrap_or_default(),
            tipo_admision: self.tipo_admision.clone().unwrap_or_default(),
            estado_academico: self.estado_academico.clone().unwrap_or_default(),
            ciudad: self.ciudad.clone().unwrap_or_default(),
            departamento: self.departamento.clone().unwrap_or_default(),
            pais: self.pais.clone().unwrap_or_default(),
            es_barranquilla: self.es_barranquilla.unwrap_or(0),
            es_colombia: self.es_colombia.unwrap_or(0),
            tipo_colegio: self.tipo_colegio.clone().unwrap_or_default(),
            calendario: self.calendario.clone().unwrap_or_default(),
            icfes_matematicas: self.icfes_matematicas.unwrap_or(0.0),
            icfes_lectura: self.icfes_lectura.unwrap_or(0.0),
            icfes_ciencias: self.icfes_ciencias.unwrap_or(0.0),
            icfes_sociales: self.icfes_sociales.unwrap_or(0.0),
            icfes_ingles: self.icfes_ingles.unwrap_or(0.0),
            icfes_total: self.icfes_total.unwrap_or(0.0),
            promedio,
            materias_cursadas: self.materias_cursadas.unwrap_or(0.0),
            materias_perdidas: self.materias_perdidas.unwrap_or(0.0),
            materias_repetidas: self.materias_repetidas.unwrap_or(0.0),
            perdidas_por_departamento: self.perdidas_por_departamento.clone(),
            becado: self
                .becado
                .clone()
                .unwrap_or_else(|| NO_SCHOLARSHIP.to_string()),
            graduado: 0,
            desertor: 0,
            periodo: self.periodo.clone().unwrap_or_default(),
        })
    }
}

/// Outcome of one score request.
#[derive(Debug, Clone)]
pub struct RiskScore {
    pub request_id: Uuid,
    pub probability: f64,
    pub warnings: EncodeWarnings,
}

/// Scores a what-if record against the population snapshot's encoding context. The
/// context is the one derived from the full reference population, never rebuilt
/// from the single record being scored, and the classifier's trained shape is
/// validated against it before encoding.
pub async fn score_what_if(
    record: &WhatIfRecord,
    snapshot: &PopulationSnapshot,
    model: &dyn DropoutClassifier,
) -> Result<RiskScore, ModelError> {
    let flat = record.to_flat()?;
    model.metadata().validate_against(&snapshot.context)?;

    let vector = encode(&flat, &snapshot.context)?;
    if !vector.warnings.is_clean() {
        eprintln!(
            "Score request encoded with warnings: {} unseen value(s), {} dropped department(s)",
            vector.warnings.unseen_values.len(),
            vector.warnings.dropped_departments.len()
        );
    }

    let probability = model.predict(&vector.values).await?;
    Ok(RiskScore {
        request_id: Uuid::new_v4(),
        probability,
        warnings: vector.warnings,
    })
}
