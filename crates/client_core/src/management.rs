//! Teacher/admin views: class creation wizard and user directory.

use std::sync::Arc;

use shared::{
    domain::{matches_search, ModuleId, Role, UserId},
    protocol::{ClassSummary, CreateClassRequest, ModuleSummary, StaffMember, UserProfile},
};
use tracing::{info, warn};

use crate::{error::ClientError, session::Session, AdminApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    Details,
    Modules,
    Students,
    Done,
}

/// Three-step class creation: details, then modules, then students. Each
/// step's list is fetched when the step is entered.
pub struct CourseWizard {
    api: Arc<dyn AdminApi>,
    step: WizardStep,
    instructors: Vec<StaffMember>,
    modules: Vec<ModuleSummary>,
    students: Vec<StaffMember>,
    selected_modules: Vec<ModuleId>,
    selected_students: Vec<UserId>,
    class: Option<ClassSummary>,
    list_error: Option<String>,
}

impl CourseWizard {
    pub fn new(api: Arc<dyn AdminApi>) -> Self {
        Self {
            api,
            step: WizardStep::Details,
            instructors: Vec::new(),
            modules: Vec::new(),
            students: Vec::new(),
            selected_modules: Vec::new(),
            selected_students: Vec::new(),
            class: None,
            list_error: None,
        }
    }

    pub async fn load_instructors(&mut self) -> Result<&[StaffMember], ClientError> {
        self.list_error = None;
        match self.api.list_instructors().await {
            Ok(instructors) => {
                self.instructors = instructors;
                Ok(&self.instructors)
            }
            Err(err) => {
                self.list_error = Some(format!("could not load the teacher list: {err}"));
                Err(err)
            }
        }
    }

    pub async fn submit_details(
        &mut self,
        name: &str,
        description: &str,
        instructor: Option<UserId>,
    ) -> Result<&ClassSummary, ClientError> {
        if self.step != WizardStep::Details {
            return Err(ClientError::validation("class details were already submitted"));
        }
        let name = name.trim();
        let description = description.trim();
        let instructor_id = match instructor {
            Some(id) if !name.is_empty() && !description.is_empty() => id,
            _ => {
                return Err(ClientError::validation(
                    "fill in every field and pick a teacher",
                ))
            }
        };

        let class = self
            .api
            .create_class(&CreateClassRequest {
                name: name.to_string(),
                description: description.to_string(),
                instructor_id,
            })
            .await?;
        info!(class_id = class.id.0, "wizard: class created");
        self.step = WizardStep::Modules;

        self.list_error = None;
        match self.api.list_modules().await {
            Ok(modules) => self.modules = modules,
            Err(err) => {
                warn!("wizard: could not load modules: {err}");
                self.list_error = Some(format!("could not load the module list: {err}"));
            }
        }
        Ok(self.class.insert(class))
    }

    /// Flips the selection of a module; returns whether it is now selected.
    pub fn toggle_module(&mut self, module_id: ModuleId) -> bool {
        toggle(&mut self.selected_modules, module_id)
    }

    pub async fn assign_modules(&mut self) -> Result<(), ClientError> {
        let class_id = match (&self.class, self.step) {
            (Some(class), WizardStep::Modules) => class.id,
            _ => return Err(ClientError::validation("create the class first")),
        };
        if self.selected_modules.is_empty() {
            return Err(ClientError::validation("select at least one module"));
        }
        self.api
            .assign_modules(class_id, &self.selected_modules)
            .await?;
        info!(
            class_id = class_id.0,
            count = self.selected_modules.len(),
            "wizard: modules assigned"
        );
        self.step = WizardStep::Students;

        self.list_error = None;
        match self.api.list_unassigned_students().await {
            Ok(students) => self.students = students,
            Err(err) => {
                warn!("wizard: could not load students: {err}");
                self.list_error = Some(format!("could not load the student list: {err}"));
            }
        }
        Ok(())
    }

    pub fn toggle_student(&mut self, student_id: UserId) -> bool {
        toggle(&mut self.selected_students, student_id)
    }

    pub async fn assign_students(&mut self) -> Result<(), ClientError> {
        let class_id = match (&self.class, self.step) {
            (Some(class), WizardStep::Students) => class.id,
            _ => return Err(ClientError::validation("assign modules first")),
        };
        if self.selected_students.is_empty() {
            return Err(ClientError::validation("select at least one student"));
        }
        self.api
            .assign_students(class_id, &self.selected_students)
            .await?;
        info!(
            class_id = class_id.0,
            count = self.selected_students.len(),
            "wizard: students assigned"
        );
        self.step = WizardStep::Done;
        Ok(())
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn instructors(&self) -> &[StaffMember] {
        &self.instructors
    }

    pub fn modules(&self) -> &[ModuleSummary] {
        &self.modules
    }

    pub fn students(&self) -> &[StaffMember] {
        &self.students
    }

    pub fn selected_modules(&self) -> &[ModuleId] {
        &self.selected_modules
    }

    pub fn selected_students(&self) -> &[UserId] {
        &self.selected_students
    }

    pub fn class(&self) -> Option<&ClassSummary> {
        self.class.as_ref()
    }

    pub fn list_error(&self) -> Option<&str> {
        self.list_error.as_deref()
    }
}

fn toggle<T: PartialEq + Copy>(selection: &mut Vec<T>, id: T) -> bool {
    if let Some(position) = selection.iter().position(|selected| *selected == id) {
        selection.remove(position);
        false
    } else {
        selection.push(id);
        true
    }
}

/// Admin-only listing of every user with role changes.
pub struct UserDirectory {
    api: Arc<dyn AdminApi>,
    session: Arc<Session>,
    users: Vec<UserProfile>,
}

impl UserDirectory {
    pub fn new(api: Arc<dyn AdminApi>, session: Arc<Session>) -> Self {
        Self {
            api,
            session,
            users: Vec::new(),
        }
    }

    pub async fn load(&mut self) -> Result<&[UserProfile], ClientError> {
        let admin = self.session.require_role(Role::Admin).await?;
        self.users = self.api.list_users(admin.user_id).await?;
        Ok(&self.users)
    }

    pub fn users(&self) -> &[UserProfile] {
        &self.users
    }

    pub fn filter_by_name(&self, query: &str) -> Vec<&UserProfile> {
        filter_users(&self.users, query)
    }

    /// Updates the local row only after the backend accepted the change.
    pub async fn change_role(&mut self, user_id: UserId, role: Role) -> Result<(), ClientError> {
        self.session.require_role(Role::Admin).await?;
        self.api.update_role(user_id, role).await?;
        if let Some(user) = self.users.iter_mut().find(|user| user.user_id == user_id) {
            user.role = role;
        }
        info!(user_id = user_id.0, %role, "users: role updated");
        Ok(())
    }
}

pub fn filter_users<'a>(users: &'a [UserProfile], query: &str) -> Vec<&'a UserProfile> {
    users
        .iter()
        .filter(|user| matches_search(&user.name, query))
        .collect()
}

#[cfg(test)]
#[path = "tests/management_tests.rs"]
mod tests;
