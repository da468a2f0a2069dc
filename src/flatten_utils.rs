// flatten_utils.rs
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Sentinel stored in `segundo_programa` when a student has no secondary program.
pub const NO_SECONDARY_PROGRAM: &str = "Ninguno";

/// Default scholarship label for students without a scholarship entry.
pub const NO_SCHOLARSHIP: &str = "No becado";

/// Categorical fields of a [`FlatRecord`], in the declared schema order. This order is
/// the first block of every feature vector and must never be reordered between releases
/// without retraining the downstream classifier.
pub const CATEGORICAL_FIELDS: [&str; 13] = [
    "genero",
    "programa",
    "segundo_programa",
    "tipo_estudiante",
    "tipo_admision",
    "estado_academico",
    "ciudad",
    "departamento",
    "pais",
    "tipo_colegio",
    "calendario",
    "becado",
    "periodo",
];

/// Numeric fields of a [`FlatRecord`] that are z-scaled at encoding time, in the
/// declared schema order.
pub const NUMERIC_FIELDS: [&str; 13] = [
    "edad",
    "estrato",
    "semestre_actual",
    "icfes_matematicas",
    "icfes_lectura",
    "icfes_ciencias",
    "icfes_sociales",
    "icfes_ingles",
    "icfes_total",
    "promedio",
    "materias_cursadas",
    "materias_perdidas",
    "materias_repetidas",
];

/// Binary flags of a [`FlatRecord`], passed through unscaled, in the declared schema order.
pub const FLAG_FIELDS: [&str; 4] = [
    "discapacidad",
    "tiene_segundo_programa",
    "es_barranquilla",
    "es_colombia",
];

/// A document identity as stored. Collections in the wild carry plain strings,
/// Mongo extended-JSON `{"$oid": "..."}` wrappers, or bare integers.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DocumentId {
    Text(String),
    Extended {
        #[serde(rename = "$oid")]
        oid: String,
    },
    Number(i64),
}

impl DocumentId {
    pub fn as_string(&self) -> String {
        match self {
            DocumentId::Text(s) => s.clone(),
            DocumentId::Extended { oid } => oid.clone(),
            DocumentId::Number(n) => n.to_string(),
        }
    }
}

/// A boolean-ish flag as stored: some loads write `true`/`false`, others `0`/`1`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Int(i64),
}

impl Flag {
    pub fn as_i64(self) -> i64 {
        match self {
            Flag::Bool(b) => i64::from(b),
            Flag::Int(n) => i64::from(n != 0),
        }
    }
}

/// A term code as stored, either the numeric form `202410` or its string form.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TermCode {
    Number(i64),
    Text(String),
}

impl TermCode {
    pub fn as_string(&self) -> String {
        match self {
            TermCode::Number(n) => n.to_string(),
            TermCode::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PersonalSection {
    pub edad: Option<f64>,
    pub genero: Option<String>,
    pub estrato: Option<f64>,
    pub discapacidad: Option<Flag>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AcademicSection {
    pub programa: Option<String>,
    pub segundo_programa: Option<String>,
    pub semestre_actual: Option<f64>,
    pub tipo_estudiante: Option<String>,
    pub tipo_admision: Option<String>,
    pub estado_academico: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationSection {
    pub ciudad: Option<String>,
    pub departamento: Option<String>,
    pub pais: Option<String>,
    pub es_barranquilla: Option<Flag>,
    pub es_colombia: Option<Flag>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchoolingSection {
    pub tipo_colegio: Option<String>,
    pub calendario: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IcfesSection {
    pub matematicas: Option<f64>,
    pub lectura_critica: Option<f64>,
    pub ciencias: Option<f64>,
    pub sociales: Option<f64>,
    pub ingles: Option<f64>,
    pub total: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PerformanceSection {
    pub promedio_acumulado: Option<f64>,
    pub materias_cursadas_total: Option<f64>,
    pub materias_perdidas_total: Option<f64>,
    pub materias_repetidas: Option<f64>,
    pub perdidas_por_departamento: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusSection {
    pub becado: Option<String>,
    pub graduado: Option<Flag>,
    pub desertor: Option<Flag>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PeriodSection {
    pub ultimo_periodo: Option<TermCode>,
}

/// One student document as retrieved from the store. Every section and every field
/// inside a section is optional; defaulting happens in exactly one place,
/// [`flatten_document`], so downstream code never re-infers a missing value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudentDocument {
    #[serde(rename = "_id")]
    pub id: Option<DocumentId>,
    #[serde(default)]
    pub datos_personales: PersonalSection,
    #[serde(default)]
    pub academico: AcademicSection,
    #[serde(default)]
    pub location: LocationSection,
    #[serde(default)]
    pub colegio: SchoolingSection,
    #[serde(rename = "ICFES", default)]
    pub icfes: IcfesSection,
    #[serde(default)]
    pub metricas_rendimiento: PerformanceSection,
    #[serde(default)]
    pub estado: StatusSection,
    #[serde(default)]
    pub periodo_info: PeriodSection,
}

/// One student, one row. Every field of every source section hoisted to the top level
/// under a fixed name, with defaults already applied. Two `FlatRecord`s produced from
/// the same population always carry the identical column set and types, no matter
/// which optional source fields were present.
///
/// Defaulting table (applied by [`flatten_document`]):
///
/// | field group                    | default when absent        |
/// |--------------------------------|----------------------------|
/// | numeric metrics and scores     | `0.0`                      |
/// | flags                          | `0`                        |
/// | free-text categoricals         | `""`                       |
/// | `segundo_programa`             | `"Ninguno"`                |
/// | `becado`                       | `"No becado"`              |
/// | `perdidas_por_departamento`    | empty map                  |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatRecord {
    pub id: String,
    pub edad: f64,
    pub genero: String,
    pub estrato: f64,
    pub discapacidad: i64,
    pub programa: String,
    pub segundo_programa: String,
    pub tiene_segundo_programa: i64,
    pub semestre_actual: f64,
    pub tipo_estudiante: String,
    pub tipo_admision: String,
    pub estado_academico: String,
    pub ciudad: String,
    pub departamento: String,
    pub pais: String,
    pub es_barranquilla: i64,
    pub es_colombia: i64,
    pub tipo_colegio: String,
    pub calendario: String,
    pub icfes_matematicas: f64,
    pub icfes_lectura: f64,
    pub icfes_ciencias: f64,
    pub icfes_sociales: f64,
    pub icfes_ingles: f64,
    pub icfes_total: f64,
    pub promedio: f64,
    pub materias_cursadas: f64,
    pub materias_perdidas: f64,
    pub materias_repetidas: f64,
    pub perdidas_por_departamento: BTreeMap<String, f64>,
    pub becado: String,
    pub graduado: i64,
    pub desertor: i64,
    pub periodo: String,
}

impl FlatRecord {
    /// Looks up a categorical field by its schema name. Returns `None` for names that
    /// are not part of [`CATEGORICAL_FIELDS`].
    pub fn categorical_value(&self, field: &str) -> Option<&str> {
        let value = match field {
            "genero" => &self.genero,
            "programa" => &self.programa,
            "segundo_programa" => &self.segundo_programa,
            "tipo_estudiante" => &self.tipo_estudiante,
            "tipo_admision" => &self.tipo_admision,
            "estado_academico" => &self.estado_academico,
            "ciudad" => &self.ciudad,
            "departamento" => &self.departamento,
            "pais" => &self.pais,
            "tipo_colegio" => &self.tipo_colegio,
            "calendario" => &self.calendario,
            "becado" => &self.becado,
            "periodo" => &self.periodo,
            _ => return None,
        };
        Some(value.as_str())
    }

    /// Looks up a scalable numeric field by its schema name.
    pub fn numeric_value(&self, field: &str) -> Option<f64> {
        let value = match field {
            "edad" => self.edad,
            "estrato" => self.estrato,
            "semestre_actual" => self.semestre_actual,
            "icfes_matematicas" => self.icfes_matematicas,
            "icfes_lectura" => self.icfes_lectura,
            "icfes_ciencias" => self.icfes_ciencias,
            "icfes_sociales" => self.icfes_sociales,
            "icfes_ingles" => self.icfes_ingles,
            "icfes_total" => self.icfes_total,
            "promedio" => self.promedio,
            "materias_cursadas" => self.materias_cursadas,
            "materias_perdidas" => self.materias_perdidas,
            "materias_repetidas" => self.materias_repetidas,
            _ => return None,
        };
        Some(value)
    }

    /// Looks up a binary flag by its schema name.
    pub fn flag_value(&self, field: &str) -> Option<i64> {
        let value = match field {
            "discapacidad" => self.discapacidad,
            "tiene_segundo_programa" => self.tiene_segundo_programa,
            "es_barranquilla" => self.es_barranquilla,
            "es_colombia" => self.es_colombia,
            _ => return None,
        };
        Some(value)
    }
}

#[derive(Debug, Error)]
pub enum FlattenError {
    #[error("document has no usable _id")]
    MissingId,
}

/// A document that could not be flattened, reported with its position in the input batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedDocument {
    pub position: usize,
    pub reason: String,
}

/// Outcome of flattening a batch. Rejection policy is skip-and-count: a bad document
/// never aborts the batch, and `accepted + rejected` always equals the input count.
#[derive(Debug, Default)]
pub struct FlattenReport {
    pub records: Vec<FlatRecord>,
    pub rejected: Vec<RejectedDocument>,
}

impl FlattenReport {
    pub fn input_count(&self) -> usize {
        self.records.len() + self.rejected.len()
    }
}

/// Derives the `tiene_segundo_programa` flag from the defaulted `segundo_programa`
/// value. Centralised here so no downstream consumer re-infers it differently.
fn has_secondary_program(segundo_programa: &str) -> i64 {
    i64::from(!segundo_programa.is_empty() && segundo_programa != NO_SECONDARY_PROGRAM)
}

/// Maps one [`StudentDocument`] to one [`FlatRecord`], applying the full defaulting
/// table in a single pass. Pure transform; the only rejection cause is a missing `_id`.
///
/// ```
/// use attriml::flatten_utils::{flatten_document, StudentDocument, DocumentId};
///
/// let mut doc = StudentDocument::default();
/// doc.id = Some(DocumentId::Text("est-001".to_string()));
///
/// let record = flatten_document(&doc).unwrap();
/// assert_eq!(record.id, "est-001");
/// assert_eq!(record.edad, 0.0);
/// assert_eq!(record.segundo_programa, "Ninguno");
/// assert_eq!(record.tiene_segundo_programa, 0);
/// assert_eq!(record.becado, "No becado");
/// assert!(record.perdidas_por_departamento.is_empty());
/// ```
pub fn flatten_document(doc: &StudentDocument) -> Result<FlatRecord, FlattenError> {
    let id = doc
        .id
        .as_ref()
        .map(DocumentId::as_string)
        .filter(|s| !s.is_empty())
        .ok_or(FlattenError::MissingId)?;

    let segundo_programa = doc
        .academico
        .segundo_programa
        .clone()
        .unwrap_or_else(|| NO_SECONDARY_PROGRAM.to_string());
    let tiene_segundo_programa = has_secondary_program(&segundo_programa);

    Ok(FlatRecord {
        id,
        edad: doc.datos_personales.edad.unwrap_or(0.0),
        genero: doc.datos_personales.genero.clone().unwrap_or_default(),
        estrato: doc.datos_personales.estrato.unwrap_or(0.0),
        discapacidad: doc
            .datos_personales
            .discapacidad
            .map_or(0, Flag::as_i64),
        programa: doc.academico.programa.clone().unwrap_or_default(),
        segundo_programa,
        tiene_segundo_programa,
        semestre_actual: doc.academico.semestre_actual.unwrap_or(0.0),
        tipo_estudiante: doc.academico.tipo_estudiante.clone().unwrap_or_default(),
        tipo_admision: doc.academico.tipo_admision.clone().unwrap_or_default(),
        estado_academico: doc.academico.estado_academico.clone().unwrap_or_default(),
        ciudad: doc.location.ciudad.clone().unwrap_or_default(),
        departamento: doc.location.departamento.clone().unwrap_or_default(),
        pais: doc.location.pais.clone().unwrap_or_default(),
        es_barranquilla: doc.location.es_barranquilla.map_or(0, Flag::as_i64),
        es_colombia: doc.location.es_colombia.map_or(0, Flag::as_i64),
        tipo_colegio: doc.colegio.tipo_colegio.clone().unwrap_or_default(),
        calendario: doc.colegio.calendario.clone().unwrap_or_default(),
        icfes_matematicas: doc.icfes.matematicas.unwrap_or(0.0),
        icfes_lectura: doc.icfes.lectura_critica.unwrap_or(0.0),
        icfes_ciencias: doc.icfes.ciencias.unwrap_or(0.0),
        icfes_sociales: doc.icfes.sociales.unwrap_or(0.0),
        icfes_ingles: doc.icfes.ingles.unwrap_or(0.0),
        icfes_total: doc.icfes.total.unwrap_or(0.0),
        promedio: doc.metricas_rendimiento.promedio_acumulado.unwrap_or(0.0),
        materias_cursadas: doc
            .metricas_rendimiento
            .materias_cursadas_total
            .unwrap_or(0.0),
        materias_perdidas: doc
            .metricas_rendimiento
            .materias_perdidas_total
            .unwrap_or(0.0),
        materias_repetidas: doc.metricas_rendimiento.materias_repetidas.unwrap_or(0.0),
        perdidas_por_departamento: doc
            .metricas_rendimiento
            .perdidas_por_departamento
            .clone()
            .unwrap_or_default(),
        becado: doc
            .estado
            .becado
            .clone()
            .unwrap_or_else(|| NO_SCHOLARSHIP.to_string()),
        graduado: doc.estado.graduado.map_or(0, Flag::as_i64),
        desertor: doc.estado.desertor.map_or(0, Flag::as_i64),
        periodo: doc
            .periodo_info
            .ultimo_periodo
            .as_ref()
            .map(TermCode::as_string)
            .unwrap_or_default(),
    })
}

/// Flattens a batch of already-decoded documents with skip-and-count rejection.
pub fn flatten_population(docs: &[StudentDocument]) -> FlattenReport {
    let mut report = FlattenReport::default();
    for (position, doc) in docs.iter().enumerate() {
        match flatten_document(doc) {
            Ok(record) => report.records.push(record),
            Err(e) => {
                eprintln!("Rejected document at position {}: {}", position, e);
                report.rejected.push(RejectedDocument {
                    position,
                    reason: e.to_string(),
                });
            }
        }
    }
    report
}

/// Flattens raw store documents. A document that does not decode into the expected
/// shape is rejected and counted the same way as one missing its `_id`.
pub fn flatten_raw_documents(values: &[Value]) -> FlattenReport {
    let mut report = FlattenReport::default();
    for (position, value) in values.iter().enumerate() {
        let doc: StudentDocument = match serde_json::from_value(value.clone()) {
            Ok(doc) => doc,
            Err(e) => {
                eprintln!("Rejected document at position {}: {}", position, e);
                report.rejected.push(RejectedDocument {
                    position,
                    reason: format!("undecodable document: {}", e),
                });
                continue;
            }
        };
        match flatten_document(&doc) {
            Ok(record) => report.records.push(record),
            Err(e) => {
                eprintln!("Rejected document at position {}: {}", position, e);
                report.rejected.push(RejectedDocument {
                    position,
                    reason: e.to_string(),
                });
            }
        }
    }
    report
}
