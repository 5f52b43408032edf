use std::time::Duration;

use crate::{
    common::{Result, SourceError},
    media::{MediaFormat, MediaKind},
};

/// Metadata tags a backend may report per stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    Language,
    Name,
}

/// Immutable public description of one elementary stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    /// 1-based, in logical order.
    pub id: u32,
    pub format: MediaFormat,
    pub language: Option<String>,
    pub name: Option<String>,
    /// At most one stream of this descriptor's kind may be active.
    pub mutually_exclusive: bool,
}

impl StreamDescriptor {
    pub fn kind(&self) -> MediaKind {
        self.format.kind()
    }
}

/// The set of streams of a source together with a selection, handed to and
/// from `MediaSource::start`.
#[derive(Debug, Clone, PartialEq)]
pub struct PresentationDescriptor {
    streams: Vec<StreamDescriptor>,
    selected: Vec<bool>,
    mime_type: String,
    total_size: u64,
    duration: Option<Duration>,
}

impl PresentationDescriptor {
    pub fn new(
        streams: Vec<StreamDescriptor>,
        selected: Vec<bool>,
        mime_type: impl Into<String>,
        total_size: u64,
        duration: Option<Duration>,
    ) -> Self {
        let mut selected = selected;
        selected.resize(streams.len(), false);
        Self {
            streams,
            selected,
            mime_type: mime_type.into(),
            total_size,
            duration,
        }
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn stream(&self, index: usize) -> Option<(&StreamDescriptor, bool)> {
        self.streams.get(index).map(|s| (s, self.selected[index]))
    }

    pub fn streams(&self) -> impl Iterator<Item = (&StreamDescriptor, bool)> {
        self.streams.iter().zip(self.selected.iter().copied())
    }

    pub fn select(&mut self, index: usize) -> Result<()> {
        self.set_selected(index, true)
    }

    pub fn deselect(&mut self, index: usize) -> Result<()> {
        self.set_selected(index, false)
    }

    fn set_selected(&mut self, index: usize, value: bool) -> Result<()> {
        match self.selected.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(SourceError::InvalidStream(index as u32 + 1)),
        }
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.get(index).copied().unwrap_or(false)
    }

    /// Ids of the selected streams, in logical order.
    pub fn selected_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.streams().filter(|(_, sel)| *sel).map(|(s, _)| s.id)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: u32) -> StreamDescriptor {
        StreamDescriptor {
            id,
            format: MediaFormat::Unknown,
            language: None,
            name: None,
            mutually_exclusive: false,
        }
    }

    #[test]
    fn selection_can_be_changed() {
        let mut pd = PresentationDescriptor::new(
            vec![descriptor(1), descriptor(2), descriptor(3)],
            vec![true],
            "video/mp4",
            1024,
            None,
        );
        assert_eq!(pd.selected_ids().collect::<Vec<_>>(), vec![1]);

        pd.select(2).unwrap();
        pd.deselect(0).unwrap();
        assert_eq!(pd.selected_ids().collect::<Vec<_>>(), vec![3]);
        assert!(pd.is_selected(2));
        assert!(!pd.is_selected(7));
    }

    #[test]
    fn out_of_range_selection_is_rejected() {
        let mut pd =
            PresentationDescriptor::new(vec![descriptor(1)], vec![false], "audio/wav", 0, None);
        assert!(matches!(pd.select(1), Err(SourceError::InvalidStream(2))));
    }
}
