//! Discovery of Cryptomatte layers from an image's channel list.
//!
//! A layer named `CryptoObject` is stored as channel groups
//! `CryptoObject00.{R,G,B,A}`, `CryptoObject01.{R,G,B,A}`, ... Each group
//! packs two ranks: `R`/`G` are id/coverage of rank `2n`, `B`/`A` are
//! id/coverage of rank `2n + 1`.

use std::collections::BTreeMap;

use crate::{
    hash::layer_hash,
    manifest::{Metadata, declared_layers, normalize_channel_suffix},
};

const RANK_DIGITS: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentKind {
    Id,
    Coverage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RankComponent {
    pub rank: usize,
    pub kind: ComponentKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Channel does not start with the layer base name.
    OtherLayer,
    /// Rank index after the base name is not exactly two digits.
    BadRankIndex(String),
    /// Suffix is not one of `.R .G .B .A`.
    BadComponent(String),
}

/// Tagged result of matching one channel name against a layer base name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelParse {
    Rank(RankComponent),
    Skip(SkipReason),
}

/// Match `channel` (already suffix-normalized or not) against `<base><NN>.<C>`.
pub fn parse_channel(channel: &str, base: &str) -> ChannelParse {
    let channel = normalize_channel_suffix(channel);
    let Some(rest) = channel.strip_prefix(base) else {
        return ChannelParse::Skip(SkipReason::OtherLayer);
    };
    let Some((index, component)) = rest.split_once('.') else {
        return ChannelParse::Skip(SkipReason::BadComponent(rest.to_string()));
    };
    if index.len() != RANK_DIGITS || !index.bytes().all(|b| b.is_ascii_digit()) {
        return ChannelParse::Skip(SkipReason::BadRankIndex(index.to_string()));
    }
    let Ok(group) = index.parse::<usize>() else {
        return ChannelParse::Skip(SkipReason::BadRankIndex(index.to_string()));
    };

    let (offset, kind) = match component {
        "R" => (0, ComponentKind::Id),
        "G" => (0, ComponentKind::Coverage),
        "B" => (1, ComponentKind::Id),
        "A" => (1, ComponentKind::Coverage),
        other => return ChannelParse::Skip(SkipReason::BadComponent(other.to_string())),
    };
    ChannelParse::Rank(RankComponent {
        rank: group * 2 + offset,
        kind,
    })
}

/// Channel names of one (id, coverage) rank.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RankChannels {
    pub rank: usize,
    pub id_channel: String,
    pub coverage_channel: String,
}

/// A discovered layer, channel names only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerInfo {
    pub name: String,
    pub hash_prefix: String,
    /// Ascending rank order, never empty.
    pub ranks: Vec<RankChannels>,
}

/// A channel that did not belong to any layer it was matched against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedChannel {
    pub channel: String,
    pub reason: String,
}

#[derive(Clone, Debug, Default)]
pub struct LayerIndex {
    layers: Vec<LayerInfo>,
    skipped: Vec<SkippedChannel>,
}

impl LayerIndex {
    /// Group `channel_names` into layers.
    ///
    /// Layer base names come from `cryptomatte/<key>/name` metadata. Without
    /// any such entry they are inferred from the channel naming pattern.
    pub fn discover<S: AsRef<str>>(channel_names: &[S], metadata: &Metadata) -> Self {
        let declared = declared_layers(metadata);
        let bases: Vec<(String, String)> = if declared.is_empty() {
            let inferred = infer_bases(channel_names);
            if !inferred.is_empty() {
                tracing::debug!(
                    layers = ?inferred,
                    "no cryptomatte metadata, inferring layers from channel names"
                );
            }
            inferred
                .into_iter()
                .map(|name| (layer_hash(&name), name))
                .collect()
        } else {
            declared.into_iter().map(|d| (d.prefix, d.name)).collect()
        };

        let mut index = Self::default();
        let mut ordered = Vec::with_capacity(bases.len());
        for (prefix, name) in bases {
            let first_seen = channel_names
                .iter()
                .position(|c| matches!(parse_channel(c.as_ref(), &name), ChannelParse::Rank(_)))
                .unwrap_or(usize::MAX);
            ordered.push((first_seen, prefix, name));
        }
        // Stable: ties (layers without channels) keep metadata order.
        ordered.sort_by_key(|(first_seen, _, _)| *first_seen);

        for (_, prefix, name) in ordered {
            match collect_layer(&name, &prefix, channel_names, &mut index.skipped) {
                Some(layer) => index.layers.push(layer),
                None => tracing::warn!(layer = %name, "dropping cryptomatte layer without complete rank pairs"),
            }
        }
        index
    }

    /// Layer names in discovery order.
    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.name.as_str()).collect()
    }

    pub fn layers(&self) -> &[LayerInfo] {
        &self.layers
    }

    pub fn get(&self, name: &str) -> Option<&LayerInfo> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Channels that looked like layer channels but failed to parse.
    pub fn skipped(&self) -> &[SkippedChannel] {
        &self.skipped
    }
}

fn collect_layer<S: AsRef<str>>(
    name: &str,
    prefix: &str,
    channel_names: &[S],
    skipped: &mut Vec<SkippedChannel>,
) -> Option<LayerInfo> {
    let mut ids = BTreeMap::<usize, String>::new();
    let mut coverages = BTreeMap::<usize, String>::new();

    for channel in channel_names {
        let channel = channel.as_ref();
        match parse_channel(channel, name) {
            ChannelParse::Rank(rc) => {
                let slot = match rc.kind {
                    ComponentKind::Id => &mut ids,
                    ComponentKind::Coverage => &mut coverages,
                };
                slot.insert(rc.rank, channel.to_string());
            }
            ChannelParse::Skip(SkipReason::OtherLayer) => {}
            ChannelParse::Skip(reason) => {
                // `CryptoObject.R` style preview channels and longer base
                // names sharing this prefix end up here.
                tracing::trace!(channel, layer = name, ?reason, "channel skipped");
                skipped.push(SkippedChannel {
                    channel: channel.to_string(),
                    reason: format!("{reason:?}"),
                });
            }
        }
    }

    let mut ranks = Vec::with_capacity(ids.len());
    for (rank, id_channel) in ids {
        match coverages.remove(&rank) {
            Some(coverage_channel) => ranks.push(RankChannels {
                rank,
                id_channel,
                coverage_channel,
            }),
            None => skipped.push(SkippedChannel {
                channel: id_channel,
                reason: format!("rank {rank} has no coverage channel"),
            }),
        }
    }
    for (rank, coverage_channel) in coverages {
        skipped.push(SkippedChannel {
            channel: coverage_channel,
            reason: format!("rank {rank} has no id channel"),
        });
    }

    if ranks.is_empty() {
        return None;
    }
    Some(LayerInfo {
        name: name.to_string(),
        hash_prefix: prefix.to_string(),
        ranks,
    })
}

/// Base names of every `<base><NN>.<RGBA>` channel, in first-seen order.
fn infer_bases<S: AsRef<str>>(channel_names: &[S]) -> Vec<String> {
    let mut out = Vec::<String>::new();
    for channel in channel_names {
        let channel = normalize_channel_suffix(channel.as_ref());
        let Some((stem, component)) = channel.rsplit_once('.') else {
            continue;
        };
        if !matches!(component, "R" | "G" | "B" | "A") || stem.len() <= RANK_DIGITS {
            continue;
        }
        let (base, index) = stem.split_at(stem.len() - RANK_DIGITS);
        if !index.bytes().all(|b| b.is_ascii_digit()) || base.ends_with('.') {
            continue;
        }
        if !out.iter().any(|b| b == base) {
            out.push(base.to_string());
        }
    }
    out
}
