use super::*;
use crate::{credential::MemoryCredentialStore, CatalogApi};
use async_trait::async_trait;
use shared::domain::ClassId;
use tokio::sync::Mutex;

#[derive(Default)]
struct TestAdminApi {
    fail_modules: bool,
    fail_role_update: bool,
    module_calls: Mutex<u32>,
    created: Mutex<Vec<CreateClassRequest>>,
    module_assignments: Mutex<Vec<(ClassId, Vec<ModuleId>)>>,
    student_assignments: Mutex<Vec<(ClassId, Vec<UserId>)>>,
    listed_for: Mutex<Vec<UserId>>,
    role_updates: Mutex<Vec<(UserId, Role)>>,
}

fn member(id: i64, name: &str) -> StaffMember {
    StaffMember {
        id: UserId(id),
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        role: None,
    }
}

fn user(id: i64, name: &str, role: Role) -> UserProfile {
    UserProfile {
        user_id: UserId(id),
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        points: 0,
        role,
    }
}

#[async_trait]
impl CatalogApi for TestAdminApi {
    async fn list_modules(&self) -> Result<Vec<ModuleSummary>, ClientError> {
        *self.module_calls.lock().await += 1;
        if self.fail_modules {
            return Err(ClientError::Http {
                status: 500,
                message: "boom".to_string(),
            });
        }
        Ok(vec![ModuleSummary {
            id: ModuleId(1),
            title: "Sismo".to_string(),
            description: String::new(),
            category: None,
            difficulty: None,
            estimated_minutes: None,
        }])
    }
}

#[async_trait]
impl AdminApi for TestAdminApi {
    async fn list_instructors(&self) -> Result<Vec<StaffMember>, ClientError> {
        Ok(vec![member(2, "Carla")])
    }

    async fn list_unassigned_students(&self) -> Result<Vec<StaffMember>, ClientError> {
        Ok(vec![member(10, "Luis"), member(11, "Marta")])
    }

    async fn create_class(
        &self,
        request: &CreateClassRequest,
    ) -> Result<ClassSummary, ClientError> {
        self.created.lock().await.push(request.clone());
        Ok(ClassSummary {
            id: ClassId(77),
            name: request.name.clone(),
            description: request.description.clone(),
            instructor_id: request.instructor_id,
            students: Vec::new(),
            modules: Vec::new(),
        })
    }

    async fn assign_modules(
        &self,
        class_id: ClassId,
        module_ids: &[ModuleId],
    ) -> Result<(), ClientError> {
        self.module_assignments
            .lock()
            .await
            .push((class_id, module_ids.to_vec()));
        Ok(())
    }

    async fn assign_students(
        &self,
        class_id: ClassId,
        student_ids: &[UserId],
    ) -> Result<(), ClientError> {
        self.student_assignments
            .lock()
            .await
            .push((class_id, student_ids.to_vec()));
        Ok(())
    }

    async fn list_users(&self, admin_id: UserId) -> Result<Vec<UserProfile>, ClientError> {
        self.listed_for.lock().await.push(admin_id);
        Ok(vec![
            user(1, "Ana Pérez", Role::Admin),
            user(2, "Carla Soto", Role::Teacher),
            user(3, "Luis Ana", Role::Student),
        ])
    }

    async fn update_role(&self, user_id: UserId, role: Role) -> Result<(), ClientError> {
        if self.fail_role_update {
            return Err(ClientError::Http {
                status: 500,
                message: "boom".to_string(),
            });
        }
        self.role_updates.lock().await.push((user_id, role));
        Ok(())
    }
}

async fn session_as(role: Role) -> Arc<Session> {
    let session = Session::new(Arc::new(MemoryCredentialStore::default()));
    session
        .establish("token".to_string(), user(1, "Ana Pérez", role))
        .await
        .expect("establish");
    session
}

#[tokio::test]
async fn wizard_walks_all_three_steps() {
    let api = Arc::new(TestAdminApi::default());
    let mut wizard = CourseWizard::new(api.clone());

    wizard.load_instructors().await.expect("instructors");
    let instructor = wizard.instructors()[0].id;
    assert!(wizard.modules().is_empty());
    assert_eq!(*api.module_calls.lock().await, 0);

    let class = wizard
        .submit_details(" Brigada 3A ", "Evacuación", Some(instructor))
        .await
        .expect("details");
    assert_eq!(class.id, ClassId(77));
    assert_eq!(wizard.step(), WizardStep::Modules);
    assert_eq!(wizard.modules().len(), 1);
    assert_eq!(*api.module_calls.lock().await, 1);

    assert!(wizard.toggle_module(ModuleId(1)));
    wizard.assign_modules().await.expect("modules");
    assert_eq!(wizard.step(), WizardStep::Students);
    assert_eq!(wizard.students().len(), 2);

    wizard.toggle_student(UserId(10));
    wizard.toggle_student(UserId(11));
    wizard.assign_students().await.expect("students");
    assert_eq!(wizard.step(), WizardStep::Done);

    let created = api.created.lock().await;
    assert_eq!(created[0].name, "Brigada 3A");
    assert_eq!(created[0].instructor_id, UserId(2));
    assert_eq!(
        api.module_assignments.lock().await.as_slice(),
        [(ClassId(77), vec![ModuleId(1)])]
    );
    assert_eq!(
        api.student_assignments.lock().await.as_slice(),
        [(ClassId(77), vec![UserId(10), UserId(11)])]
    );
}

#[tokio::test]
async fn wizard_details_require_every_field() {
    let api = Arc::new(TestAdminApi::default());
    let mut wizard = CourseWizard::new(api.clone());

    let err = wizard
        .submit_details("Brigada", "Evacuación", None)
        .await
        .expect_err("no instructor");
    assert!(matches!(err, ClientError::Validation(_)));
    let err = wizard
        .submit_details("", "Evacuación", Some(UserId(2)))
        .await
        .expect_err("no name");
    assert!(matches!(err, ClientError::Validation(_)));

    assert_eq!(wizard.step(), WizardStep::Details);
    assert!(api.created.lock().await.is_empty());
}

#[tokio::test]
async fn wizard_needs_a_selection_before_advancing() {
    let mut wizard = CourseWizard::new(Arc::new(TestAdminApi::default()));
    assert!(wizard.assign_modules().await.is_err());

    wizard
        .submit_details("Brigada", "Evacuación", Some(UserId(2)))
        .await
        .expect("details");
    assert!(wizard.toggle_module(ModuleId(1)));
    assert!(!wizard.toggle_module(ModuleId(1)));

    let err = wizard.assign_modules().await.expect_err("nothing selected");
    assert_eq!(err.to_string(), "select at least one module");
    assert_eq!(wizard.step(), WizardStep::Modules);
}

#[tokio::test]
async fn wizard_module_list_failure_is_kept_for_display() {
    let mut wizard = CourseWizard::new(Arc::new(TestAdminApi {
        fail_modules: true,
        ..TestAdminApi::default()
    }));

    wizard
        .submit_details("Brigada", "Evacuación", Some(UserId(2)))
        .await
        .expect("class still created");

    assert_eq!(wizard.step(), WizardStep::Modules);
    assert!(wizard.modules().is_empty());
    assert!(wizard
        .list_error()
        .is_some_and(|message| message.contains("module list")));
}

#[tokio::test]
async fn wizard_clears_list_error_once_a_later_list_loads() {
    let mut wizard = CourseWizard::new(Arc::new(TestAdminApi {
        fail_modules: true,
        ..TestAdminApi::default()
    }));

    wizard
        .submit_details("Brigada", "Evacuación", Some(UserId(2)))
        .await
        .expect("class still created");
    assert!(wizard.list_error().is_some());

    wizard.toggle_module(ModuleId(1));
    wizard.assign_modules().await.expect("modules");

    assert_eq!(wizard.students().len(), 2);
    assert_eq!(wizard.list_error(), None);
}

#[tokio::test]
async fn directory_is_admin_only() {
    let api = Arc::new(TestAdminApi::default());
    let mut directory = UserDirectory::new(api.clone(), session_as(Role::Teacher).await);

    let err = directory.load().await.expect_err("teacher");

    assert_eq!(err.category(), crate::ErrorCategory::Permission);
    assert!(api.listed_for.lock().await.is_empty());
}

#[tokio::test]
async fn directory_lists_and_filters_by_name() {
    let api = Arc::new(TestAdminApi::default());
    let mut directory = UserDirectory::new(api.clone(), session_as(Role::Admin).await);

    directory.load().await.expect("load");

    assert_eq!(api.listed_for.lock().await.as_slice(), [UserId(1)]);
    let names: Vec<_> = directory
        .filter_by_name("ANA")
        .into_iter()
        .map(|user| user.name.as_str())
        .collect();
    assert_eq!(names, vec!["Ana Pérez", "Luis Ana"]);
    assert_eq!(directory.filter_by_name("").len(), 3);
}

#[tokio::test]
async fn role_change_updates_row_only_after_success() {
    let api = Arc::new(TestAdminApi::default());
    let mut directory = UserDirectory::new(api.clone(), session_as(Role::Admin).await);
    directory.load().await.expect("load");

    directory
        .change_role(UserId(3), Role::Teacher)
        .await
        .expect("change");
    assert_eq!(directory.users()[2].role, Role::Teacher);
    assert_eq!(
        api.role_updates.lock().await.as_slice(),
        [(UserId(3), Role::Teacher)]
    );

    let failing = Arc::new(TestAdminApi {
        fail_role_update: true,
        ..TestAdminApi::default()
    });
    let mut directory = UserDirectory::new(failing, session_as(Role::Admin).await);
    directory.load().await.expect("load");
    directory
        .change_role(UserId(3), Role::Admin)
        .await
        .expect_err("backend refused");
    assert_eq!(directory.users()[2].role, Role::Student);
}
