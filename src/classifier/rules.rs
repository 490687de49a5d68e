//! The default classification rule table
//!
//! Order matters: the first matching rule wins, so narrower signatures are
//! registered before broader ones that could also match the same payload.
//!
//! 1. One exact discriminator rule per JSON kind (`"type"` / `"messageType"`)
//! 2. The COCO rule, whose bare key markers are the broadest JSON signature
//! 3. Header-line rules for the delimited legacy formats

use super::{ClassificationRule, Discriminator, ScanWindow};
use crate::types::{LegacyFormat, MessageKind};

/// Bare keys that identify a COCO annotation document without a discriminator
const COCO_MARKERS: [&str; 3] = ["\"annotations\"", "\"categories\"", "\"images\""];

/// Build the default rule table for a scan window
pub fn default_rules(window: ScanWindow) -> Vec<ClassificationRule> {
    let mut rules: Vec<ClassificationRule> = MessageKind::json_kinds()
        .into_iter()
        .filter(|kind| *kind != MessageKind::CocoAnnotation)
        .map(|kind| {
            ClassificationRule::json(kind, window)
                .discriminator(Discriminator::TypeField(kind.name().into()))
        })
        .collect();

    let mut coco = ClassificationRule::json(MessageKind::CocoAnnotation, window)
        .discriminator(Discriminator::TypeField(MessageKind::CocoAnnotation.name().into()));
    for marker in COCO_MARKERS {
        coco = coco.discriminator(Discriminator::Token(marker.into()));
    }
    rules.push(coco);

    for format in LegacyFormat::ALL {
        let mut rule = ClassificationRule::header(
            MessageKind::DelimitedLegacyFormat(format),
            format.header_prefix(),
        );
        if let Some(ext) = format.required_extension() {
            rule = rule.required_extension(ext);
        }
        rules.push(rule);
    }

    rules
}
