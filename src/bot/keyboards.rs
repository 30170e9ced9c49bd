//! Inline keyboards and callback data

use crate::models::{InlineKeyboardButton, InlineKeyboardMarkup, UserChannel};

/// Action encoded in an inline button's callback data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    /// `usr:<user_id> rm:<channel_id>`
    Remove { user_id: i64, channel_id: i64 },
    /// `page:<n>`, 1-based
    Page(usize),
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        if let Some(rest) = data.strip_prefix("usr:") {
            let (user, channel) = rest.split_once(' ')?;
            let channel = channel.strip_prefix("rm:")?;
            return Some(CallbackAction::Remove {
                user_id: user.parse().ok()?,
                channel_id: channel.parse().ok()?,
            });
        }
        if let Some(page) = data.strip_prefix("page:") {
            return page.parse().ok().filter(|&p| p >= 1).map(CallbackAction::Page);
        }
        None
    }

    pub fn encode(&self) -> String {
        match self {
            CallbackAction::Remove {
                user_id,
                channel_id,
            } => format!("usr:{} rm:{}", user_id, channel_id),
            CallbackAction::Page(page) => format!("page:{}", page),
        }
    }
}

fn button(text: &str, action: CallbackAction) -> InlineKeyboardButton {
    InlineKeyboardButton {
        text: text.to_string(),
        callback_data: action.encode(),
    }
}

/// Number of pages needed for `total` items, at least one
pub fn page_count(total: usize, per_page: usize) -> usize {
    total.div_ceil(per_page.max(1)).max(1)
}

/// One page of removal buttons with `<<<` / `>>>` navigation.
///
/// `page` is 1-based and clamped to the available pages.
pub fn removal_page(
    user_id: i64,
    channels: &[UserChannel],
    page: usize,
    per_page: usize,
) -> InlineKeyboardMarkup {
    let per_page = per_page.max(1);
    let page = page.clamp(1, page_count(channels.len(), per_page));
    let start = (page - 1) * per_page;
    let end = (start + per_page).min(channels.len());

    let mut rows: Vec<Vec<InlineKeyboardButton>> = channels[start..end]
        .iter()
        .map(|channel| {
            vec![button(
                &channel.name,
                CallbackAction::Remove {
                    user_id,
                    channel_id: channel.id,
                },
            )]
        })
        .collect();

    let mut navigation = Vec::new();
    if page > 1 {
        navigation.push(button("<<<", CallbackAction::Page(page - 1)));
    }
    if end < channels.len() {
        navigation.push(button(">>>", CallbackAction::Page(page + 1)));
    }
    if !navigation.is_empty() {
        rows.push(navigation);
    }

    InlineKeyboardMarkup {
        inline_keyboard: rows,
    }
}
