use super::{ReportRenderer, unsupported};
use crate::error::{Error, Result};
use crate::types::{Message, MessageAttachment, MessageThread, ReportDetails, ReportFormat};
use chrono::{DateTime, Utc};
use std::fmt::{self, Write};

/// Plain text report
///
/// Channel reports are laid out as thread views: the root message flush left,
/// replies indented below it. Chat and single-thread reports list every message
/// at the same indentation. Threads whose root predates the cutoff start with a
/// `<<Conversation started before ...>>` marker.
#[derive(Clone, Copy, Debug, Default)]
pub struct TxtRenderer;

impl ReportRenderer for TxtRenderer {
    fn supports(&self, format: ReportFormat) -> bool {
        format == ReportFormat::Txt
    }

    fn render(&self, details: &ReportDetails, format: ReportFormat) -> Result<Vec<u8>> {
        if !self.supports(format) {
            return Err(unsupported(format, "TXT"));
        }

        let mut out = String::new();
        write_report(&mut out, details)
            .map_err(|e| Error::Render(format!("failed to write TXT report: {e}")))?;
        Ok(out.into_bytes())
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%d %B %Y, %-I:%M:%S %p %:z").to_string()
}

fn write_report(out: &mut String, details: &ReportDetails) -> fmt::Result {
    let team = details.team_name.as_deref().unwrap_or_default();
    let channel = details.channel_name.as_deref().unwrap_or_default();

    if details.is_channel {
        writeln!(out, "History bot backup from '{team}' team, '{channel}' channel")?;
    }
    if details.is_conversation {
        writeln!(
            out,
            "History bot backup of conversation(thread) from '{team}' team, '{channel}' channel"
        )?;
    }
    if details.is_group_chat {
        writeln!(out, "History bot backup from group chat")?;
    }

    match details.since {
        Some(since) => writeln!(
            out,
            "Showing all messages posted between {} and {}",
            timestamp(since),
            timestamp(details.till)
        )?,
        None => writeln!(
            out,
            "Showing all messages posted till {}",
            timestamp(details.till)
        )?,
    }
    writeln!(
        out,
        "Generated at {} by {}",
        timestamp(details.till),
        details.author.as_deref().unwrap_or_default()
    )?;
    writeln!(out)?;

    for thread in &details.threads {
        write_thread(out, thread, details.since, details.is_channel)?;
        writeln!(out)?;
    }
    Ok(())
}

fn write_thread(
    out: &mut String,
    thread: &MessageThread,
    since: Option<DateTime<Utc>>,
    thread_view: bool,
) -> fmt::Result {
    if !thread.is_full {
        if let Some(since) = since {
            writeln!(out, "<<Conversation started before {}>>", timestamp(since))?;
            writeln!(out)?;
        }
    }

    for (position, message) in thread.messages.iter().enumerate() {
        let is_root = thread_view && thread.is_full && position == 0;
        write_message(out, message, is_root, thread_view)?;
    }
    Ok(())
}

fn write_message(out: &mut String, message: &Message, is_root: bool, thread_view: bool) -> fmt::Result {
    let (prefix, text_prefix) = match (is_root, thread_view) {
        (true, _) => ("", ""),
        (false, true) => ("            ", ">>          "),
        (false, false) => ("    ", ">>  "),
    };

    if is_root {
        if let Some(subject) = message.subject.as_deref().filter(|s| !s.is_empty()) {
            writeln!(out, "{prefix}Subject: {subject}")?;
        }
    }

    writeln!(out, "{text_prefix}Message text: {}", message.body.content)?;
    writeln!(out, "{prefix}- posted at {}", timestamp(message.created_date_time))?;
    if let Some(modified) = message.last_modified_date_time {
        writeln!(out, "{prefix}- last modified at {}", timestamp(modified))?;
    }
    if let Some(deleted) = message.deleted_date_time {
        writeln!(out, "{prefix}- deleted at {}", timestamp(deleted))?;
    }
    for name in message.sender_names() {
        writeln!(out, "{prefix}- by {name}")?;
    }
    writeln!(
        out,
        "{prefix}- priority - {}",
        message.importance.as_deref().unwrap_or_default()
    )?;

    if !message.reactions.is_empty() {
        // group by reaction type, first-seen order
        let mut groups: Vec<(&str, usize)> = Vec::new();
        for reaction in &message.reactions {
            match groups.iter_mut().find(|(kind, _)| *kind == reaction.reaction_type) {
                Some((_, count)) => *count += 1,
                None => groups.push((reaction.reaction_type.as_str(), 1)),
            }
        }
        let summary: Vec<String> = groups
            .iter()
            .map(|(kind, count)| format!("{kind}({count})"))
            .collect();
        writeln!(out, "{prefix}- reactions: {}", summary.join(", "))?;
    }

    if !message.attachments.is_empty() {
        writeln!(out, "{prefix}- attachments:")?;
        for attachment in &message.attachments {
            writeln!(out, "{prefix}{prefix}{}", describe_attachment(attachment))?;
        }
    }

    writeln!(out)
}

fn describe_attachment(attachment: &MessageAttachment) -> String {
    let present = |value: &Option<String>| value.as_deref().filter(|v| !v.is_empty()).map(str::to_string);

    let mut line = String::new();
    if let Some(url) = present(&attachment.content_url) {
        line.push_str(&format!("ContentUrl: {url} "));
    }
    if let Some(content) = present(&attachment.content) {
        let collapsed = content.split_whitespace().collect::<Vec<_>>().join(" ");
        line.push_str(&format!("Content: {collapsed} "));
    }
    if let Some(content_type) = present(&attachment.content_type) {
        line.push_str(&format!("ContentType: {content_type} "));
    }
    if let Some(name) = present(&attachment.name) {
        line.push_str(&format!("Name: {name} "));
    }
    if let Some(thumbnail) = present(&attachment.thumbnail_url) {
        line.push_str(&format!("ThumbnailUrl: {thumbnail} "));
    }
    line.trim_end().to_string()
}
