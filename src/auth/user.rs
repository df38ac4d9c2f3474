use std::collections::BTreeSet;

/// Роль администратора.
pub const ADMIN_ROLE: &str = "admin";

/// Принципал, привязанный к соединению после входа.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub verified: bool,
    pub is_active: bool,
    pub roles: BTreeSet<String>,
}

impl User {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: String::new(),
            verified: true,
            is_active: true,
            roles: BTreeSet::new(),
        }
    }

    pub fn with_role(
        mut self,
        role: impl Into<String>,
    ) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn with_email(
        mut self,
        email: impl Into<String>,
    ) -> Self {
        self.email = email.into();
        self
    }

    pub fn is_admin(&self) -> bool {
        self.roles.contains(ADMIN_ROLE)
    }

    /// Пользователь активен и подтверждён.
    pub fn is_valid(&self) -> bool {
        self.is_active && self.verified
    }
}
