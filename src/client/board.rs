use crate::bus::Preview;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BoardStatus {
    #[default]
    None,
    Building,
    Error,
    Ready,
}

impl BoardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Building => "building",
            Self::Error => "error",
            Self::Ready => "ready",
        }
    }
}

impl std::fmt::Display for BoardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What applying a preview set did to the board, by identity key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardChange {
    pub inserted: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

/// Build status plus the ordered previews shown for one file.
#[derive(Debug, Clone, Default)]
pub struct PreviewBoard {
    status: BoardStatus,
    file_name: Option<String>,
    previews: Vec<Preview>,
}

impl PreviewBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> BoardStatus {
        self.status
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn previews(&self) -> &[Preview] {
        &self.previews
    }

    pub fn building(&mut self) {
        self.status = BoardStatus::Building;
    }

    pub fn failed(&mut self) {
        self.status = BoardStatus::Error;
    }

    /// Merge a fresh preview set. Entries already shown keep their position
    /// and take the new title, size and markup; new entries go in at their
    /// index; entries no longer present are removed. A set for a different
    /// file replaces the board.
    pub fn apply(&mut self, file_name: &str, previews: Vec<Preview>) -> BoardChange {
        self.status = BoardStatus::Ready;
        let mut change = BoardChange::default();

        if self.file_name.as_deref() != Some(file_name) {
            change
                .removed
                .extend(self.previews.drain(..).map(|p| p.class_name));
            self.file_name = Some(file_name.to_string());
        }

        for (index, preview) in previews.iter().enumerate() {
            match self
                .previews
                .iter_mut()
                .find(|shown| shown.identity_key() == preview.identity_key())
            {
                Some(shown) => {
                    shown.title = preview.title.clone();
                    shown.width = preview.width;
                    shown.height = preview.height;
                    shown.html = preview.html.clone();
                    change.updated.push(preview.class_name.clone());
                }
                None => {
                    let at = index.min(self.previews.len());
                    self.previews.insert(at, preview.clone());
                    change.inserted.push(preview.class_name.clone());
                }
            }
        }

        let mut removed = Vec::new();
        self.previews.retain(|shown| {
            let keep = previews
                .iter()
                .any(|p| p.identity_key() == shown.identity_key());
            if !keep {
                removed.push(shown.class_name.clone());
            }
            keep
        });
        change.removed.extend(removed);
        change
    }
}
