//! User-facing message texts and the main keyboard.

use signal_core::entitlement::DenyReason;
use signal_core::scorer::{Direction, ScoreResult};

use crate::transport::{Button, Keyboard};

pub const GET_SIGNAL_ACTION: &str = "get_signal";
pub const OWNER_PANEL_ACTION: &str = "owner_panel";

/// Confidence above which the interactive reply is marked as strong.
const STRONG_CONFIDENCE: u32 = 70;

fn direction_label(direction: Direction) -> &'static str {
    match direction {
        Direction::Up => "UP ⬆️",
        Direction::Down => "DOWN ⬇️",
    }
}

pub fn main_keyboard(is_owner: bool) -> Keyboard {
    let keyboard = Keyboard::default().row(vec![Button::new("🚀 GET SIGNAL", GET_SIGNAL_ACTION)]);
    if is_owner {
        keyboard.row(vec![Button::new("🛠 OWNER PANEL", OWNER_PANEL_ACTION)])
    } else {
        keyboard
    }
}

pub fn welcome(owner: &str) -> String {
    format!("🔥 Trading Signal Bot\n\nOwner: {owner} 📲\n\nClick below to get signal 👇")
}

/// Reply to an interactive "get signal" request.
pub fn signal_reply(result: &ScoreResult, owner: &str) -> String {
    let marker = if result.confidence > STRONG_CONFIDENCE {
        "✅"
    } else {
        "⚡"
    };
    format!(
        "PAIR: {} 🎢\nTIME: {} 🕛\nDIRECTION: {}\nCONFIDENCE: {}% {marker}\n\nOwner: {owner} 📲",
        result.pair,
        result.timeframe,
        direction_label(result.direction),
        result.confidence,
    )
}

/// Broadcast message for live subscriptions.
pub fn auto_signal(result: &ScoreResult, owner: &str) -> String {
    format!(
        "🔥 AUTO SIGNAL\n\nPAIR: {}\nTIME: {}\nDIRECTION: {}\nCONFIDENCE: {}%\n\nOwner: {owner} 📲",
        result.pair,
        result.timeframe,
        direction_label(result.direction),
        result.confidence,
    )
}

/// Sent instead of the signal to inactive or expired subscriptions.
pub fn disabled_notice(owner: &str) -> String {
    format!("Signal Disabled ❌\nContact Owner {owner} 📲")
}

pub fn no_signal(owner: &str) -> String {
    format!("No signal available right now ⏳\nTry again in a minute.\n\nOwner: {owner} 📲")
}

pub fn denial(reason: DenyReason, owner: &str) -> String {
    let headline = match reason {
        DenyReason::NotAuthorized => "Access Denied ❌",
        DenyReason::Expired => "Subscription Expired ❌",
        DenyReason::QuotaExceeded => "Daily Limit Reached ❌",
    };
    format!("{headline}\n\nContact Owner {owner} 📲")
}

/// Short ephemeral notice shown when a button press is refused.
pub fn denial_toast(reason: DenyReason) -> &'static str {
    match reason {
        DenyReason::NotAuthorized => "Access Denied ❌",
        DenyReason::Expired => "Subscription Expired ❌",
        DenyReason::QuotaExceeded => "Daily Limit Reached ❌",
    }
}

pub const TEMPORARY_FAILURE_TOAST: &str = "Something went wrong, please try again ⚠️";
