use crate::canvas::model::{DocumentPoint, Image, Stroke};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Selection {
    pub strokes: Vec<Stroke>,
    pub images: Vec<Image>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty() && self.images.is_empty()
    }
}

/// Receives what the user selected; moving and editing the selection is the
/// receiver's business.
pub trait SelectionSink: Send + Sync {
    /// A finished lasso, in document space, with the content it encloses.
    fn on_lasso(&self, path: &[DocumentPoint], selection: Selection);
    /// Content picked by rectangle selection or freshly inserted.
    fn on_selection(&self, selection: Selection);
}
