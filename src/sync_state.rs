// Dirty-state resolution for open documents
//
// A document can be compared against at most two baselines: the content last
// saved to its local file, and the content last known on the portal. Which of
// the two differ from the buffer decides what closing the tab must offer.

use crate::types::{ModuleType, ScriptType};
use serde::{Deserialize, Serialize};

/// Content last written to (or read from) the local file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalBaseline {
    pub handle_id: String,
    pub last_saved_content: String,
}

/// Content last fetched from or pushed to the portal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalBaseline {
    pub portal_id: String,
    pub module_id: u64,
    pub module_type: ModuleType,
    pub script_type: ScriptType,
    pub last_known_content: String,
}

/// Where an open document came from, with the baselines it is compared against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "plane", rename_all = "snake_case")]
pub enum DocumentPlane {
    Scratch,
    Local(LocalBaseline),
    Portal(PortalBaseline),
    LocalAndPortal {
        local: LocalBaseline,
        portal: PortalBaseline,
    },
}

impl DocumentPlane {
    pub fn local(&self) -> Option<&LocalBaseline> {
        match self {
            DocumentPlane::Local(local) | DocumentPlane::LocalAndPortal { local, .. } => Some(local),
            DocumentPlane::Scratch | DocumentPlane::Portal(_) => None,
        }
    }

    pub fn portal(&self) -> Option<&PortalBaseline> {
        match self {
            DocumentPlane::Portal(portal) | DocumentPlane::LocalAndPortal { portal, .. } => {
                Some(portal)
            }
            DocumentPlane::Scratch | DocumentPlane::Local(_) => None,
        }
    }

    /// Plane after the buffer was saved to a local file
    pub fn with_local_save(self, handle_id: &str, content: &str) -> Self {
        let local = LocalBaseline {
            handle_id: handle_id.to_string(),
            last_saved_content: content.to_string(),
        };
        match self {
            DocumentPlane::Scratch | DocumentPlane::Local(_) => DocumentPlane::Local(local),
            DocumentPlane::Portal(portal) | DocumentPlane::LocalAndPortal { portal, .. } => {
                DocumentPlane::LocalAndPortal { local, portal }
            }
        }
    }

    /// Plane after the buffer was pushed to (or pulled from) the portal
    pub fn with_portal_sync(self, content: &str) -> Self {
        match self {
            DocumentPlane::Portal(mut portal) => {
                portal.last_known_content = content.to_string();
                DocumentPlane::Portal(portal)
            }
            DocumentPlane::LocalAndPortal { local, mut portal } => {
                portal.last_known_content = content.to_string();
                DocumentPlane::LocalAndPortal { local, portal }
            }
            other => other,
        }
    }
}

/// Which baselines the current content differs from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirtyState {
    Clean,
    FileOnly,
    PortalOnly,
    Both,
}

impl DirtyState {
    /// Compare `content` against the baselines `plane` carries
    pub fn resolve(content: &str, plane: &DocumentPlane) -> Self {
        let file_dirty = plane
            .local()
            .is_some_and(|local| local.last_saved_content != content);
        let portal_dirty = plane
            .portal()
            .is_some_and(|portal| portal.last_known_content != content);

        match (file_dirty, portal_dirty) {
            (false, false) => DirtyState::Clean,
            (true, false) => DirtyState::FileOnly,
            (false, true) => DirtyState::PortalOnly,
            (true, true) => DirtyState::Both,
        }
    }

    pub fn is_dirty(&self) -> bool {
        !matches!(self, DirtyState::Clean)
    }

    /// What closing a document in this state must offer
    pub fn close_prompt(&self) -> ClosePrompt {
        match self {
            DirtyState::Clean => ClosePrompt::CloseSilently,
            DirtyState::FileOnly => ClosePrompt::Confirm {
                state: *self,
                actions: vec![CloseAction::SaveAndClose, CloseAction::Discard],
            },
            DirtyState::PortalOnly => ClosePrompt::Confirm {
                state: *self,
                actions: vec![
                    CloseAction::PushToPortal,
                    CloseAction::SaveToDirectory,
                    CloseAction::CloseWithoutPushing,
                ],
            },
            DirtyState::Both => ClosePrompt::Confirm {
                state: *self,
                actions: vec![
                    CloseAction::SaveToDirectory,
                    CloseAction::PushToPortal,
                    CloseAction::Discard,
                ],
            },
        }
    }
}

/// A choice offered when closing a dirty document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseAction {
    SaveAndClose,
    Discard,
    PushToPortal,
    SaveToDirectory,
    /// Local content is already safe; only the portal copy stays behind
    CloseWithoutPushing,
}

impl CloseAction {
    /// Whether choosing this loses edits that exist nowhere else
    pub fn is_destructive(&self) -> bool {
        matches!(self, CloseAction::Discard)
    }
}

/// Close-confirmation behavior for one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "prompt", rename_all = "snake_case")]
pub enum ClosePrompt {
    CloseSilently,
    Confirm {
        state: DirtyState,
        actions: Vec<CloseAction>,
    },
}

impl ClosePrompt {
    pub fn actions(&self) -> &[CloseAction] {
        match self {
            ClosePrompt::CloseSilently => &[],
            ClosePrompt::Confirm { actions, .. } => actions,
        }
    }
}

/// Resolve the close prompt for a buffer in one step
pub fn close_prompt_for(content: &str, plane: &DocumentPlane) -> ClosePrompt {
    DirtyState::resolve(content, plane).close_prompt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(content: &str) -> LocalBaseline {
        LocalBaseline {
            handle_id: "f-1".into(),
            last_saved_content: content.into(),
        }
    }

    fn portal(content: &str) -> PortalBaseline {
        PortalBaseline {
            portal_id: "p-1".into(),
            module_id: 12,
            module_type: ModuleType::DataSource,
            script_type: ScriptType::Collection,
            last_known_content: content.into(),
        }
    }

    fn both(l: &str, r: &str) -> DocumentPlane {
        DocumentPlane::LocalAndPortal {
            local: local(l),
            portal: portal(r),
        }
    }

    #[test]
    fn test_four_way_table() {
        assert_eq!(DirtyState::resolve("C", &both("C", "C")), DirtyState::Clean);
        assert_eq!(DirtyState::resolve("C", &both("D", "C")), DirtyState::FileOnly);
        assert_eq!(DirtyState::resolve("C", &both("C", "D")), DirtyState::PortalOnly);
        assert_eq!(DirtyState::resolve("C", &both("D1", "D2")), DirtyState::Both);
    }

    #[test]
    fn test_missing_baselines_are_never_dirty() {
        assert_eq!(DirtyState::resolve("anything", &DocumentPlane::Scratch), DirtyState::Clean);
        assert_eq!(
            DirtyState::resolve("C", &DocumentPlane::Portal(portal("D"))),
            DirtyState::PortalOnly
        );
        assert_eq!(
            DirtyState::resolve("C", &DocumentPlane::Local(local("D"))),
            DirtyState::FileOnly
        );
    }

    #[test]
    fn test_close_prompts() {
        assert_eq!(DirtyState::Clean.close_prompt(), ClosePrompt::CloseSilently);

        let file_only = DirtyState::FileOnly.close_prompt();
        assert_eq!(
            file_only.actions(),
            &[CloseAction::SaveAndClose, CloseAction::Discard]
        );

        // Local content is safe, so nothing offered is destructive
        let portal_only = DirtyState::PortalOnly.close_prompt();
        assert!(portal_only.actions().iter().all(|a| !a.is_destructive()));
        assert!(portal_only.actions().contains(&CloseAction::CloseWithoutPushing));

        let both = DirtyState::Both.close_prompt();
        assert!(both.actions().contains(&CloseAction::SaveToDirectory));
        assert!(both.actions().contains(&CloseAction::PushToPortal));
        assert!(both.actions().iter().any(|a| a.is_destructive()));
    }

    #[test]
    fn test_plane_transitions() {
        let plane = DocumentPlane::Portal(portal("old")).with_local_save("f-9", "new");
        assert_eq!(plane.local().unwrap().handle_id, "f-9");
        assert_eq!(DirtyState::resolve("new", &plane), DirtyState::PortalOnly);

        let plane = plane.with_portal_sync("new");
        assert_eq!(DirtyState::resolve("new", &plane), DirtyState::Clean);

        let scratch = DocumentPlane::Scratch.with_portal_sync("x");
        assert_eq!(scratch, DocumentPlane::Scratch);
    }

    #[test]
    fn test_plane_serde_is_tagged() {
        let json = serde_json::to_value(DocumentPlane::Local(local("x"))).unwrap();
        assert_eq!(json["plane"], "local");
        assert_eq!(json["handleId"], "f-1");

        let json = serde_json::to_value(both("a", "b")).unwrap();
        assert_eq!(json["plane"], "local_and_portal");
        assert_eq!(json["portal"]["scriptType"], "collection");
    }
}
