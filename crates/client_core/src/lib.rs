use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{ClassId, ContentId, ModuleId, Role, UserId},
    protocol::{
        ChangePasswordRequest, ClassSummary, CreateClassRequest, ForgotPasswordRequest,
        LoginRequest, LoginResponse, Module, ModuleSummary, ProgressSummary, RegisterRequest,
        ResetPasswordRequest, SimulationAttempt, SimulationStateRecord, StaffMember,
        UpdateProfileRequest, UpdateRoleRequest, UserProfile,
    },
};
use tracing::{debug, info, warn};
use url::Url;

pub mod account;
pub mod catalog;
pub mod credential;
pub mod error;
pub mod management;
pub mod progress;
pub mod session;
pub mod simulation;

pub use error::{ClientError, ErrorCategory};
pub use progress::ProgressFilters;
pub use session::{LogoutReason, ProfileSource, Session, SessionEvent, SessionState};

use account::{PasswordChangeForm, PasswordResetForm, ProfileForm, RegistrationForm};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";

#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn list_modules(&self) -> Result<Vec<ModuleSummary>, ClientError>;
}

#[async_trait]
pub trait SimulationApi: Send + Sync {
    async fn module_detail(&self, module_id: ModuleId) -> Result<Module, ClientError>;
    /// `None` when nothing has been persisted for the content yet.
    async fn simulation_state(
        &self,
        content_id: ContentId,
    ) -> Result<Option<SimulationStateRecord>, ClientError>;
    async fn submit_attempt(&self, attempt: &SimulationAttempt) -> Result<(), ClientError>;
    async fn reset_simulation(&self, content_id: ContentId) -> Result<(), ClientError>;
}

#[async_trait]
pub trait ProgressApi: CatalogApi {
    async fn progress_summary(
        &self,
        filters: &ProgressFilters,
    ) -> Result<ProgressSummary, ClientError>;
}

#[async_trait]
pub trait AdminApi: CatalogApi {
    async fn list_instructors(&self) -> Result<Vec<StaffMember>, ClientError>;
    async fn list_unassigned_students(&self) -> Result<Vec<StaffMember>, ClientError>;
    async fn create_class(&self, request: &CreateClassRequest)
        -> Result<ClassSummary, ClientError>;
    async fn assign_modules(
        &self,
        class_id: ClassId,
        module_ids: &[ModuleId],
    ) -> Result<(), ClientError>;
    async fn assign_students(
        &self,
        class_id: ClassId,
        student_ids: &[UserId],
    ) -> Result<(), ClientError>;
    async fn list_users(&self, admin_id: UserId) -> Result<Vec<UserProfile>, ClientError>;
    async fn update_role(&self, user_id: UserId, role: Role) -> Result<(), ClientError>;
}

/// HTTP client for the Reacciona REST API. Every authenticated call takes
/// its bearer token from the injected [`Session`]; a 401/403 answer logs the
/// session out.
pub struct ReaccionaClient {
    http: Client,
    base_url: String,
    session: Arc<Session>,
}

impl ReaccionaClient {
    pub fn new(base_url: &str, session: Arc<Session>) -> Result<Self, ClientError> {
        Ok(Self {
            http: Client::new(),
            base_url: normalize_base_url(base_url)?,
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Session init against this backend.
    pub async fn restore_session(&self) -> Result<SessionState, ClientError> {
        self.session.init(self).await
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, request: RequestBuilder, path: &str) -> Result<Response, ClientError> {
        let response = request.send().await.map_err(ClientError::Network)?;
        let status = response.status();
        debug!(%status, path, "api: response");
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::from_response(status.as_u16(), path, &body))
    }

    async fn authed(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        let token = self
            .session
            .token()
            .await
            .ok_or(ClientError::NotAuthenticated)?;
        Ok(self.http.request(method, self.endpoint(path)).bearer_auth(token))
    }

    async fn send_authed(
        &self,
        request: RequestBuilder,
        path: &str,
    ) -> Result<Response, ClientError> {
        match self.send(request, path).await {
            Err(err @ ClientError::Unauthorized { .. }) => {
                warn!(path, "api: credential rejected, logging out");
                self.session.logout(LogoutReason::CredentialRejected).await;
                Err(err)
            }
            other => other,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let request = self.authed(Method::GET, path).await?;
        decode(self.send_authed(request, path).await?).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, ClientError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(ClientError::validation("email and password are required"));
        }
        let path = "/api/auth/login";
        let request = self.http.post(self.endpoint(path)).json(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        });
        let response = match self.send(request, path).await {
            Ok(response) => response,
            Err(ClientError::Network(err)) => return Err(ClientError::Network(err)),
            Err(err) => {
                debug!("api: login rejected: {err}");
                return Err(ClientError::InvalidLogin);
            }
        };
        let LoginResponse { token } = decode(response).await?;
        let profile = self.fetch_profile(&token).await?;
        self.session.establish(token, profile.clone()).await?;
        Ok(profile)
    }

    pub async fn logout(&self) {
        self.session.logout(LogoutReason::UserRequested).await;
    }

    pub async fn register(&self, form: RegistrationForm) -> Result<(), ClientError> {
        let body: RegisterRequest = form.validate()?;
        let path = "/api/auth/register";
        let request = self.http.post(self.endpoint(path)).json(&body);
        self.send(request, path).await?;
        info!(email = %body.email, "api: registered new account");
        Ok(())
    }

    /// Succeeds whether or not the email is registered; only a transport
    /// failure is reported.
    pub async fn forgot_password(&self, email: &str) -> Result<(), ClientError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(ClientError::validation("email is required"));
        }
        let path = "/api/auth/forgot-password";
        let request = self
            .http
            .post(self.endpoint(path))
            .json(&ForgotPasswordRequest {
                email: email.to_string(),
            });
        match self.send(request, path).await {
            Err(ClientError::Network(err)) => Err(ClientError::Network(err)),
            Err(err) => {
                debug!("api: forgot-password answered with {err}");
                Ok(())
            }
            Ok(_) => Ok(()),
        }
    }

    pub async fn reset_password(&self, form: PasswordResetForm) -> Result<(), ClientError> {
        let body: ResetPasswordRequest = form.validate()?;
        let path = "/api/auth/reset-password";
        let request = self.http.post(self.endpoint(path)).json(&body);
        self.send(request, path).await?;
        Ok(())
    }

    pub async fn refresh_profile(&self) -> Result<UserProfile, ClientError> {
        let profile: UserProfile = self.get_json("/api/usuarios/me").await?;
        self.session.replace_profile(profile.clone()).await;
        Ok(profile)
    }

    pub async fn update_profile(&self, form: ProfileForm) -> Result<UserProfile, ClientError> {
        let body: UpdateProfileRequest = form.validate()?;
        let path = "/api/usuarios/me";
        let request = self.authed(Method::PUT, path).await?.json(&body);
        self.send_authed(request, path).await?;
        self.refresh_profile().await
    }

    pub async fn change_password(&self, form: PasswordChangeForm) -> Result<(), ClientError> {
        let body: ChangePasswordRequest = form.validate()?;
        let path = "/api/usuarios/me/change-password";
        let request = self.authed(Method::PUT, path).await?.json(&body);
        self.send_authed(request, path).await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileSource for ReaccionaClient {
    async fn fetch_profile(&self, token: &str) -> Result<UserProfile, ClientError> {
        let path = "/api/usuarios/me";
        let request = self.http.get(self.endpoint(path)).bearer_auth(token);
        decode(self.send(request, path).await?).await
    }
}

#[async_trait]
impl CatalogApi for ReaccionaClient {
    async fn list_modules(&self) -> Result<Vec<ModuleSummary>, ClientError> {
        self.get_json("/api/modulos").await
    }
}

#[async_trait]
impl SimulationApi for ReaccionaClient {
    async fn module_detail(&self, module_id: ModuleId) -> Result<Module, ClientError> {
        self.get_json(&format!("/api/modulos/{}", module_id.0))
            .await
    }

    async fn simulation_state(
        &self,
        content_id: ContentId,
    ) -> Result<Option<SimulationStateRecord>, ClientError> {
        match self
            .get_json(&format!("/api/simulaciones/{}/estado", content_id.0))
            .await
        {
            Ok(record) => Ok(Some(record)),
            Err(ClientError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn submit_attempt(&self, attempt: &SimulationAttempt) -> Result<(), ClientError> {
        let path = format!("/api/simulaciones/{}/intentos", attempt.content_id.0);
        let request = self.authed(Method::POST, &path).await?.json(attempt);
        self.send_authed(request, &path).await?;
        Ok(())
    }

    async fn reset_simulation(&self, content_id: ContentId) -> Result<(), ClientError> {
        let path = format!("/api/simulaciones/{}/estado", content_id.0);
        let request = self.authed(Method::DELETE, &path).await?;
        match self.send_authed(request, &path).await {
            Ok(_) | Err(ClientError::NotFound { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl ProgressApi for ReaccionaClient {
    async fn progress_summary(
        &self,
        filters: &ProgressFilters,
    ) -> Result<ProgressSummary, ClientError> {
        let path = "/api/progress/summary";
        let request = self
            .authed(Method::GET, path)
            .await?
            .query(&filters.query_pairs());
        decode(self.send_authed(request, path).await?).await
    }
}

#[async_trait]
impl AdminApi for ReaccionaClient {
    async fn list_instructors(&self) -> Result<Vec<StaffMember>, ClientError> {
        self.get_json("/api/usuarios/rol/docentes").await
    }

    async fn list_unassigned_students(&self) -> Result<Vec<StaffMember>, ClientError> {
        self.get_json("/api/usuarios/rol/estudiante/clase-empty")
            .await
    }

    async fn create_class(
        &self,
        request: &CreateClassRequest,
    ) -> Result<ClassSummary, ClientError> {
        let path = "/api/clases";
        let builder = self.authed(Method::POST, path).await?.json(request);
        decode(self.send_authed(builder, path).await?).await
    }

    async fn assign_modules(
        &self,
        class_id: ClassId,
        module_ids: &[ModuleId],
    ) -> Result<(), ClientError> {
        let path = format!("/api/clases/{}/modulos", class_id.0);
        let request = self.authed(Method::POST, &path).await?.json(module_ids);
        self.send_authed(request, &path).await?;
        Ok(())
    }

    async fn assign_students(
        &self,
        class_id: ClassId,
        student_ids: &[UserId],
    ) -> Result<(), ClientError> {
        let path = format!("/api/usuarios/{}/asignar-clase", class_id.0);
        let request = self.authed(Method::POST, &path).await?.json(student_ids);
        self.send_authed(request, &path).await?;
        Ok(())
    }

    async fn list_users(&self, admin_id: UserId) -> Result<Vec<UserProfile>, ClientError> {
        self.get_json(&format!("/api/usuarios/all/{}", admin_id.0))
            .await
    }

    async fn update_role(&self, user_id: UserId, role: Role) -> Result<(), ClientError> {
        let path = "/api/usuarios/update-role";
        let request = self
            .authed(Method::PUT, path)
            .await?
            .json(&UpdateRoleRequest { user_id, role });
        self.send_authed(request, path).await?;
        Ok(())
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    response.json().await.map_err(ClientError::Decode)
}

/// Validates the configured API root and strips trailing slashes so paths
/// can be appended verbatim.
pub fn normalize_base_url(raw: &str) -> Result<String, ClientError> {
    let trimmed = raw.trim();
    let trimmed = if trimmed.is_empty() {
        DEFAULT_API_BASE_URL
    } else {
        trimmed
    };
    let parsed = Url::parse(trimmed).map_err(|source| ClientError::BaseUrl {
        url: trimmed.to_string(),
        source,
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ClientError::validation(format!(
            "API base url must start with http:// or https://, got '{trimmed}'"
        )));
    }
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
