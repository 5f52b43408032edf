//! Logical stream ordering, descriptor derivation and backend binding.

use std::{fmt, sync::Arc};

use tracing::{debug, warn};

use crate::{
    backend::StreamCatalog,
    configs::SourceConfig,
    media::{MediaFormat, MediaKind, StreamDescriptor, TagKind},
};

/// How backend streams are exposed, and which of them start active.
pub trait StreamOrderPolicy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Backend indices in the order they are exposed to consumers.
    fn order(&self, kinds: &[MediaKind]) -> Vec<usize>;

    /// Whether the default-active stream of a kind is the last one in backend
    /// enumeration order rather than the first.
    fn prefers_last(&self) -> bool;
}

/// Logical stream `i` is backend stream `i`; the first stream of each kind
/// starts active.
#[derive(Debug, Default, Clone, Copy)]
pub struct NaturalOrder;

impl StreamOrderPolicy for NaturalOrder {
    fn name(&self) -> &'static str {
        "natural"
    }

    fn order(&self, kinds: &[MediaKind]) -> Vec<usize> {
        (0..kinds.len()).collect()
    }

    fn prefers_last(&self) -> bool {
        false
    }
}

/// Audio streams, then video, then everything else, each group in reverse
/// backend order; the last stream of each kind starts active.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReverseGroupedByKind;

fn group_rank(kind: MediaKind) -> u8 {
    match kind {
        MediaKind::Audio => 0,
        MediaKind::Video => 1,
        MediaKind::Subtitle | MediaKind::Unknown => 2,
    }
}

impl StreamOrderPolicy for ReverseGroupedByKind {
    fn name(&self) -> &'static str {
        "reverse-grouped"
    }

    fn order(&self, kinds: &[MediaKind]) -> Vec<usize> {
        (0..=2)
            .flat_map(|rank| {
                (0..kinds.len())
                    .rev()
                    .filter(move |&i| group_rank(kinds[i]) == rank)
            })
            .collect()
    }

    fn prefers_last(&self) -> bool {
        true
    }
}

/// Picks the ordering policy for a probed mime type.
pub fn policy_for(config: &SourceConfig, mime_type: &str) -> Arc<dyn StreamOrderPolicy> {
    if config.reorders(mime_type) {
        Arc::new(ReverseGroupedByKind)
    } else {
        Arc::new(NaturalOrder)
    }
}

/// Kinds of which `selected` activates more than one mutually exclusive
/// stream.
pub(crate) fn exclusive_conflicts(
    descriptors: &[StreamDescriptor],
    selected: &[bool],
) -> Vec<MediaKind> {
    [MediaKind::Audio, MediaKind::Video]
        .into_iter()
        .filter(|&kind| {
            descriptors
                .iter()
                .zip(selected)
                .filter(|(d, on)| **on && d.mutually_exclusive && d.kind() == kind)
                .count()
                > 1
        })
        .collect()
}

/// Result of planning: per logical stream, the planned backend index, the
/// public descriptor and whether it starts active.
#[derive(Debug, Clone)]
pub struct StreamLayout {
    pub order: Vec<usize>,
    pub descriptors: Vec<StreamDescriptor>,
    pub default_active: Vec<bool>,
}

impl StreamLayout {
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct StreamMapper {
    policy: Arc<dyn StreamOrderPolicy>,
}

impl StreamMapper {
    pub fn new(policy: Arc<dyn StreamOrderPolicy>) -> Self {
        Self { policy }
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    pub fn plan<C: StreamCatalog + ?Sized>(&self, catalog: &C) -> StreamLayout {
        let formats: Vec<MediaFormat> = (0..catalog.stream_count())
            .map(|i| catalog.preferred_format(i).unwrap_or(MediaFormat::Unknown))
            .collect();
        let kinds: Vec<MediaKind> = formats.iter().map(MediaFormat::kind).collect();
        let order = self.policy.order(&kinds);

        let mut descriptors: Vec<StreamDescriptor> = order
            .iter()
            .enumerate()
            .map(|(logical, &backend)| StreamDescriptor {
                id: logical as u32 + 1,
                format: formats[backend].advertised(),
                language: catalog.tag(backend, TagKind::Language),
                name: catalog.tag(backend, TagKind::Name),
                mutually_exclusive: false,
            })
            .collect();

        // Every audio or video stream of a kind that appears more than once
        // is exclusive.
        for i in 0..descriptors.len() {
            let kind = descriptors[i].kind();
            if !kind.is_elementary() {
                continue;
            }
            if descriptors.iter().filter(|d| d.kind() == kind).count() > 1 {
                descriptors[i].mutually_exclusive = true;
            }
        }

        let mut default_active = vec![false; descriptors.len()];
        for logical in 0..descriptors.len() {
            let kind = descriptors[logical].kind();
            if !kind.is_elementary() {
                continue;
            }
            let candidates = (0..descriptors.len()).filter(|&l| descriptors[l].kind() == kind);
            let chosen = if self.policy.prefers_last() {
                candidates.max_by_key(|&l| order[l])
            } else {
                candidates.min_by_key(|&l| order[l])
            };
            default_active[logical] = chosen == Some(logical);
        }

        debug!(
            "StreamMapper: {} policy, order {:?}, default active {:?}",
            self.policy.name(),
            order,
            default_active
        );

        StreamLayout {
            order,
            descriptors,
            default_active,
        }
    }

    /// Binds each logical stream to a connected backend stream. Entries are
    /// `backend_index + 1`, or 0 when nothing of the right kind exists.
    pub fn bind<C: StreamCatalog + ?Sized>(
        &self,
        layout: &StreamLayout,
        backend: &C,
    ) -> Vec<usize> {
        let count = backend.stream_count();
        let kinds: Vec<MediaKind> = (0..count)
            .map(|i| {
                backend
                    .preferred_format(i)
                    .map(|f| f.kind())
                    .unwrap_or(MediaKind::Unknown)
            })
            .collect();

        let mut taken = vec![false; count];
        let mut map = vec![0; layout.len()];

        for (logical, &planned) in layout.order.iter().enumerate() {
            if planned < count && kinds[planned] == layout.descriptors[logical].kind() {
                map[logical] = planned + 1;
                taken[planned] = true;
            }
        }

        for logical in 0..layout.len() {
            if map[logical] != 0 {
                continue;
            }
            let kind = layout.descriptors[logical].kind();
            match (0..count).find(|&b| !taken[b] && kinds[b] == kind) {
                Some(b) => {
                    map[logical] = b + 1;
                    taken[b] = true;
                }
                None => warn!(
                    "StreamMapper: no backend stream for logical stream {} ({})",
                    logical, kind
                ),
            }
        }

        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{ProbeInfo, ProbedStream},
        media::{AudioFormat, PixelFormat, VideoFormat},
    };

    fn audio(codec: &str) -> MediaFormat {
        MediaFormat::Audio(AudioFormat {
            codec: codec.into(),
            sample_rate: Some(48000),
            channels: Some(2),
            bits_per_sample: None,
        })
    }

    fn video(pixel_format: PixelFormat) -> MediaFormat {
        MediaFormat::Video(VideoFormat {
            codec: "raw".into(),
            pixel_format: Some(pixel_format),
            width: 320,
            height: 240,
        })
    }

    fn probe(formats: Vec<MediaFormat>) -> ProbeInfo {
        ProbeInfo {
            mime_type: "video/mp4".into(),
            duration: None,
            streams: formats.into_iter().map(ProbedStream::new).collect(),
        }
    }

    fn av_av_sub() -> ProbeInfo {
        probe(vec![
            audio("aac"),
            video(PixelFormat::Nv12),
            audio("opus"),
            video(PixelFormat::Nv12),
            MediaFormat::Subtitle {
                codec: "tx3g".into(),
            },
        ])
    }

    #[test]
    fn natural_order_activates_first_of_each_kind() {
        let layout = StreamMapper::new(Arc::new(NaturalOrder)).plan(&av_av_sub());
        assert_eq!(layout.order, vec![0, 1, 2, 3, 4]);
        assert_eq!(layout.default_active, vec![true, true, false, false, false]);
        let ids: Vec<u32> = layout.descriptors.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn reverse_grouping_activates_last_of_each_kind() {
        let layout = StreamMapper::new(Arc::new(ReverseGroupedByKind)).plan(&av_av_sub());
        assert_eq!(layout.order, vec![2, 0, 3, 1, 4]);
        // Logical 0 is backend audio 2, logical 2 is backend video 3.
        assert_eq!(layout.default_active, vec![true, false, true, false, false]);
        assert_eq!(layout.descriptors[0].format.codec(), Some("opus"));
    }

    #[test]
    fn repeated_kinds_are_mutually_exclusive() {
        let info = probe(vec![
            audio("aac"),
            audio("ac3"),
            video(PixelFormat::Nv12),
            MediaFormat::Unknown,
            MediaFormat::Unknown,
            MediaFormat::Subtitle {
                codec: "tx3g".into(),
            },
            MediaFormat::Subtitle {
                codec: "tx3g".into(),
            },
        ]);
        let layout = StreamMapper::new(Arc::new(NaturalOrder)).plan(&info);
        let flags: Vec<bool> = layout
            .descriptors
            .iter()
            .map(|d| d.mutually_exclusive)
            .collect();
        assert_eq!(flags, vec![true, true, false, false, false, false, false]);
        assert_eq!(
            layout.default_active,
            vec![true, false, true, false, false, false, false]
        );
    }

    #[test]
    fn descriptors_advertise_nv12_and_copy_tags() {
        let mut info = probe(vec![video(PixelFormat::I420)]);
        info.streams[0].language = Some("en".into());
        info.streams[0].name = Some("Main".into());

        let layout = StreamMapper::new(Arc::new(NaturalOrder)).plan(&info);
        let descriptor = &layout.descriptors[0];
        assert_eq!(descriptor.format, video(PixelFormat::Nv12));
        assert_eq!(descriptor.language.as_deref(), Some("en"));
        assert_eq!(descriptor.name.as_deref(), Some("Main"));
    }

    #[test]
    fn bind_follows_plan_when_backend_agrees() {
        let mapper = StreamMapper::new(Arc::new(ReverseGroupedByKind));
        let info = av_av_sub();
        let layout = mapper.plan(&info);
        assert_eq!(mapper.bind(&layout, &info), vec![3, 1, 4, 2, 5]);
    }

    #[test]
    fn bind_falls_back_to_first_free_stream_of_kind() {
        let mapper = StreamMapper::new(Arc::new(NaturalOrder));
        let layout = mapper.plan(&probe(vec![audio("aac"), video(PixelFormat::Nv12)]));
        // The connected backend enumerates video first and has no second audio.
        let backend = probe(vec![video(PixelFormat::Nv12), audio("aac")]);
        assert_eq!(mapper.bind(&layout, &backend), vec![2, 1]);

        let empty = probe(vec![]);
        assert_eq!(mapper.bind(&layout, &empty), vec![0, 0]);
    }

    #[test]
    fn detects_several_exclusive_streams_selected_together() {
        let layout = StreamMapper::new(Arc::new(NaturalOrder)).plan(&av_av_sub());
        let descriptors = &layout.descriptors;

        assert!(exclusive_conflicts(descriptors, &layout.default_active).is_empty());
        assert_eq!(
            exclusive_conflicts(descriptors, &[true, true, true, false, true]),
            vec![MediaKind::Audio]
        );
        assert_eq!(
            exclusive_conflicts(descriptors, &[true, true, true, true, false]),
            vec![MediaKind::Audio, MediaKind::Video]
        );
    }

    #[test]
    fn policy_is_selected_by_mime_type() {
        let config = SourceConfig::default();
        assert_eq!(policy_for(&config, "video/mp4").name(), "reverse-grouped");
        assert_eq!(policy_for(&config, "audio/ogg").name(), "natural");
    }
}
