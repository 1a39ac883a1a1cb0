use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::{
    ClassId, ContentId, ContentType, EmergencyCategory, ModuleId, ModuleStatus, OptionId, Role,
    StepId, UserId,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(rename = "nombre")]
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(rename = "puntos")]
    pub points: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "idUsuario")]
    pub user_id: UserId,
    #[serde(rename = "nombre")]
    pub name: String,
    pub email: String,
    #[serde(rename = "puntos", default)]
    pub points: i64,
    #[serde(rename = "idRol")]
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(rename = "nombre")]
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirmation_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRoleRequest {
    #[serde(rename = "idUsuario")]
    pub user_id: UserId,
    #[serde(rename = "idRol")]
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRef {
    #[serde(rename = "idRol")]
    pub role: Role,
    #[serde(rename = "nombreRol")]
    pub name: String,
}

/// Entry of the teacher and unassigned-student lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: UserId,
    #[serde(rename = "nombre")]
    pub name: String,
    pub email: String,
    #[serde(rename = "rol", default, skip_serializing_if = "Option::is_none")]
    pub role: Option<RoleRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateClassRequest {
    #[serde(rename = "nombreClase")]
    pub name: String,
    #[serde(rename = "descripcion")]
    pub description: String,
    #[serde(rename = "idDocenteCreador")]
    pub instructor_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassSummary {
    pub id: ClassId,
    #[serde(rename = "nombreClase")]
    pub name: String,
    #[serde(rename = "descripcion", default)]
    pub description: String,
    #[serde(rename = "idDocenteCreador")]
    pub instructor_id: UserId,
    #[serde(rename = "alumnos", default)]
    pub students: Vec<serde_json::Value>,
    #[serde(rename = "modulos", default)]
    pub modules: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSummary {
    pub id: ModuleId,
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "descripcion", default)]
    pub description: String,
    #[serde(rename = "tipoEmergencia", default)]
    pub category: Option<EmergencyCategory>,
    #[serde(rename = "nivelDificultad", default)]
    pub difficulty: Option<String>,
    #[serde(rename = "tiempoEstimado", default)]
    pub estimated_minutes: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub id: ModuleId,
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "descripcion", default)]
    pub description: String,
    #[serde(rename = "tipoEmergencia", default)]
    pub category: Option<EmergencyCategory>,
    #[serde(rename = "nivelDificultad", default)]
    pub difficulty: Option<String>,
    #[serde(rename = "tiempoEstimado", default)]
    pub estimated_minutes: Option<u32>,
    #[serde(rename = "contenidos", default)]
    pub contents: Vec<Content>,
}

impl Module {
    /// First content that carries a playable step list.
    pub fn simulation_content(&self) -> Option<&Content> {
        self.contents.iter().find(|content| !content.steps.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub id: ContentId,
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "tipoContenido")]
    pub content_type: ContentType,
    #[serde(rename = "urlRecurso", default)]
    pub resource_url: Option<String>,
    #[serde(rename = "cuerpo", default)]
    pub body: String,
    #[serde(rename = "orden", default)]
    pub order: i32,
    #[serde(rename = "pasosSimulacion", default)]
    pub steps: Vec<SimulationStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationStep {
    #[serde(rename = "idPaso")]
    pub id: StepId,
    #[serde(rename = "descripcion", default)]
    pub description: String,
    #[serde(rename = "orden", default)]
    pub order: i32,
    #[serde(rename = "escenario", default)]
    pub scenario: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
    #[serde(rename = "opcionesPaso", default)]
    pub options: Vec<StepOption>,
}

impl SimulationStep {
    /// File name of the step video. Stored paths may be Windows paths.
    pub fn video_file_name(&self) -> Option<&str> {
        let video = self.video.as_deref()?.trim();
        if video.is_empty() {
            return None;
        }
        video
            .rsplit(|c: char| c == '\\' || c == '/')
            .next()
            .filter(|name| !name.is_empty())
    }

    pub fn option(&self, option_id: OptionId) -> Option<&StepOption> {
        self.options.iter().find(|option| option.id == option_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOption {
    #[serde(rename = "idOpcion")]
    pub id: OptionId,
    #[serde(rename = "textoOpcion")]
    pub text: String,
    #[serde(rename = "esCorrecto")]
    pub is_correct: bool,
    #[serde(default)]
    pub feedback: String,
    #[serde(rename = "videoRama", default, skip_serializing_if = "Option::is_none")]
    pub branch_video: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationAttempt {
    #[serde(rename = "contenidoId")]
    pub content_id: ContentId,
    #[serde(rename = "pasoId")]
    pub step_id: StepId,
    #[serde(rename = "esCorrecto")]
    pub is_correct: bool,
    #[serde(rename = "puntaje")]
    pub score: u32,
    #[serde(rename = "opcionSeleccionadaId")]
    pub selected_option_id: OptionId,
}

/// Persisted player position for one content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationStateRecord {
    #[serde(rename = "pasoActual", default)]
    pub current_step_index: usize,
    #[serde(rename = "opcionBloqueadaId", default)]
    pub locked_option_id: Option<OptionId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleProgress {
    pub module_id: ModuleId,
    #[serde(rename = "titulo")]
    pub title: String,
    pub status: ModuleStatus,
    #[serde(rename = "pasosCompletados")]
    pub completed_steps: u32,
    #[serde(rename = "pasosTotales")]
    pub total_steps: u32,
    #[serde(rename = "puntajeTotal")]
    pub score: i64,
    #[serde(rename = "porcentaje", deserialize_with = "deserialize_percent")]
    pub percent: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Achievement {
    #[serde(rename = "codigo")]
    pub code: String,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion", default)]
    pub description: String,
    #[serde(rename = "icono", default)]
    pub icon: String,
    #[serde(
        rename = "fechaObtencion",
        default,
        deserialize_with = "deserialize_timestamp"
    )]
    pub obtained_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub total_modules: u32,
    pub completed_modules: u32,
    pub in_progress_modules: u32,
    #[serde(default)]
    pub not_started_modules: u32,
    pub total_score: i64,
    #[serde(default)]
    pub modules: Vec<ModuleProgress>,
    #[serde(default)]
    pub achievements: Vec<Achievement>,
}

/// Accepts RFC 3339, zone-less ISO timestamps and bare dates; anything else
/// is dropped instead of failing the whole summary.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

/// The backend computes this as a plain number, so fractions are rounded.
fn deserialize_percent<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(raw.round().clamp(0.0, 100.0) as u8)
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_utc());
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(parsed);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}
