//! Per-request requester context.
//!
//! Authentication lives in front of this service; the gateway forwards the
//! resolved role in a header and we only enforce it.

/// Role the upstream gateway resolved for the requester.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RequesterRole {
    Viewer,
    Editor,
    Admin,
}

impl RequesterRole {
    /// Parse a role header value. Unknown or missing values degrade to the
    /// least-privileged role.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => RequesterRole::Admin,
            "editor" => RequesterRole::Editor,
            _ => RequesterRole::Viewer,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequesterRole::Viewer => "viewer",
            RequesterRole::Editor => "editor",
            RequesterRole::Admin => "admin",
        }
    }
}

/// Requester context for a request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RequesterContext {
    role: RequesterRole,
}

impl RequesterContext {
    pub fn new(role: RequesterRole) -> Self {
        Self { role }
    }

    pub fn role(&self) -> RequesterRole {
        self.role
    }

    /// Viewers may read job lists but not submit.
    pub fn can_submit(&self) -> bool {
        !matches!(self.role, RequesterRole::Viewer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_roles_degrade_to_viewer() {
        assert_eq!(RequesterRole::parse("EDITOR"), RequesterRole::Editor);
        assert_eq!(RequesterRole::parse(" admin "), RequesterRole::Admin);
        assert_eq!(RequesterRole::parse("superuser"), RequesterRole::Viewer);
        assert_eq!(RequesterRole::parse(""), RequesterRole::Viewer);
    }

    #[test]
    fn viewers_cannot_submit() {
        assert!(!RequesterContext::new(RequesterRole::Viewer).can_submit());
        assert!(RequesterContext::new(RequesterRole::Editor).can_submit());
        assert!(RequesterContext::new(RequesterRole::Admin).can_submit());
    }
}
