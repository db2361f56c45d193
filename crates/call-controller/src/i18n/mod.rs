//! Localised messages for client-facing business errors.
//!
//! The catalog is deliberately small: every business error maps to one
//! message key, and the API facade resolves the key against the caller's
//! negotiated language. Unknown languages fall back to the configured
//! default, unknown keys to the key name itself.

/// Languages with a full catalog.
pub const SUPPORTED_LANGUAGES: &[&str] = &["en-US", "zh-CN", "ja-JP"];

/// Fallback when the configured default is itself unknown.
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Message keys for localisable client-facing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKey {
    InvalidParameters,
    RoomAlreadyExists,
    ChannelHasActiveRoom,
    CreatorInAnotherCall,
    ParticipantInCall,
    RoomNotFound,
    RoomNotActive,
    RoomFull,
    ParticipantNotFound,
    ParticipantNotInvited,
    InternalError,
}

impl MessageKey {
    /// Stable identifier used as the `code` field of error responses.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKey::InvalidParameters => "invalid_parameters",
            MessageKey::RoomAlreadyExists => "room_already_exists",
            MessageKey::ChannelHasActiveRoom => "channel_has_active_room",
            MessageKey::CreatorInAnotherCall => "creator_in_another_call",
            MessageKey::ParticipantInCall => "participant_in_call",
            MessageKey::RoomNotFound => "room_not_found",
            MessageKey::RoomNotActive => "room_not_active",
            MessageKey::RoomFull => "room_full",
            MessageKey::ParticipantNotFound => "participant_not_found",
            MessageKey::ParticipantNotInvited => "participant_not_invited",
            MessageKey::InternalError => "internal_error",
        }
    }
}

/// Normalise a requested language to a supported one.
///
/// `Accept-Language` values may carry quality lists; only the first tag is
/// considered. Unsupported or empty input yields `default`.
#[must_use]
pub fn negotiate<'a>(requested: &'a str, default: &'a str) -> &'a str {
    let tag = requested
        .split(',')
        .next()
        .map(|t| t.split(';').next().unwrap_or(t).trim())
        .unwrap_or("");

    if SUPPORTED_LANGUAGES.contains(&tag) {
        return tag;
    }
    if SUPPORTED_LANGUAGES.contains(&default) {
        return default;
    }
    DEFAULT_LANGUAGE
}

/// Resolve a message key in the given language, substituting `{}` with
/// `arg` when present.
#[must_use]
pub fn translate(lang: &str, key: MessageKey, arg: Option<&str>) -> String {
    let template = lookup(lang, key)
        .or_else(|| lookup(DEFAULT_LANGUAGE, key))
        .unwrap_or_else(|| key.as_str());

    match arg {
        Some(arg) => template.replacen("{}", arg, 1),
        None => template.to_string(),
    }
}

fn lookup(lang: &str, key: MessageKey) -> Option<&'static str> {
    let msg = match (lang, key) {
        ("en-US", MessageKey::InvalidParameters) => "Invalid parameters",
        ("en-US", MessageKey::RoomAlreadyExists) => "Room already exists: {}",
        ("en-US", MessageKey::ChannelHasActiveRoom) => {
            "An active room already exists for this channel"
        }
        ("en-US", MessageKey::CreatorInAnotherCall) => {
            "Creator is in another call, cannot create room"
        }
        ("en-US", MessageKey::ParticipantInCall) => {
            "Participant {} is in a call, cannot invite"
        }
        ("en-US", MessageKey::RoomNotFound) => "Room not found: {}",
        ("en-US", MessageKey::RoomNotActive) => {
            "Room has ended or been cancelled, cannot join"
        }
        ("en-US", MessageKey::RoomFull) => "Room is full",
        ("en-US", MessageKey::ParticipantNotFound) => "Participant not found: {}",
        ("en-US", MessageKey::ParticipantNotInvited) => {
            "You are not invited to join this room"
        }
        ("en-US", MessageKey::InternalError) => "An internal error occurred",

        ("zh-CN", MessageKey::InvalidParameters) => "参数错误",
        ("zh-CN", MessageKey::RoomAlreadyExists) => "房间已存在: {}",
        ("zh-CN", MessageKey::ChannelHasActiveRoom) => "该渠道已存在正在通话的房间",
        ("zh-CN", MessageKey::CreatorInAnotherCall) => {
            "创建者正在进行其他通话，无法创建房间"
        }
        ("zh-CN", MessageKey::ParticipantInCall) => "参与者 {} 正在通话中，无法邀请",
        ("zh-CN", MessageKey::RoomNotFound) => "房间不存在: {}",
        ("zh-CN", MessageKey::RoomNotActive) => "房间已结束或已取消，无法加入",
        ("zh-CN", MessageKey::RoomFull) => "房间人数已满",
        ("zh-CN", MessageKey::ParticipantNotFound) => "参与者不存在: {}",
        ("zh-CN", MessageKey::ParticipantNotInvited) => "您未被邀请加入此房间",
        ("zh-CN", MessageKey::InternalError) => "服务器内部错误",

        ("ja-JP", MessageKey::InvalidParameters) => "無効なパラメータ",
        ("ja-JP", MessageKey::RoomAlreadyExists) => "ルームは既に存在します: {}",
        ("ja-JP", MessageKey::ChannelHasActiveRoom) => {
            "このチャネルには既にアクティブなルームが存在します"
        }
        ("ja-JP", MessageKey::CreatorInAnotherCall) => {
            "作成者は別の通話中です。ルームを作成できません"
        }
        ("ja-JP", MessageKey::ParticipantInCall) => {
            "参加者 {} は通話中のため招待できません"
        }
        ("ja-JP", MessageKey::RoomNotFound) => "ルームが見つかりません: {}",
        ("ja-JP", MessageKey::RoomNotActive) => {
            "ルームは終了またはキャンセルされたため参加できません"
        }
        ("ja-JP", MessageKey::RoomFull) => "ルームは満員です",
        ("ja-JP", MessageKey::ParticipantNotFound) => "参加者が見つかりません: {}",
        ("ja-JP", MessageKey::ParticipantNotInvited) => {
            "このルームには招待されていません"
        }
        ("ja-JP", MessageKey::InternalError) => "内部エラーが発生しました",

        _ => return None,
    };
    Some(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiate_supported_language() {
        assert_eq!(negotiate("zh-CN", "en-US"), "zh-CN");
    }

    #[test]
    fn test_negotiate_accept_language_quality_list() {
        assert_eq!(negotiate("ja-JP,en-US;q=0.8", "en-US"), "ja-JP");
        assert_eq!(negotiate("zh-CN;q=0.9, en-US", "en-US"), "zh-CN");
    }

    #[test]
    fn test_negotiate_unknown_falls_back_to_default() {
        assert_eq!(negotiate("fr-FR", "zh-CN"), "zh-CN");
        assert_eq!(negotiate("", "en-US"), "en-US");
    }

    #[test]
    fn test_negotiate_unknown_default_falls_back_to_builtin() {
        assert_eq!(negotiate("fr-FR", "de-DE"), DEFAULT_LANGUAGE);
    }

    #[test]
    fn test_translate_substitutes_argument() {
        let msg = translate("en-US", MessageKey::RoomNotFound, Some("r-42"));
        assert_eq!(msg, "Room not found: r-42");
    }

    #[test]
    fn test_translate_without_argument_keeps_template() {
        let msg = translate("en-US", MessageKey::RoomNotFound, None);
        assert_eq!(msg, "Room not found: {}");
    }

    #[test]
    fn test_translate_unknown_language_uses_default_catalog() {
        let msg = translate("ko-KR", MessageKey::RoomFull, None);
        assert_eq!(msg, "Room is full");
    }

    #[test]
    fn test_every_key_has_entries_in_all_languages() {
        let keys = [
            MessageKey::InvalidParameters,
            MessageKey::RoomAlreadyExists,
            MessageKey::ChannelHasActiveRoom,
            MessageKey::CreatorInAnotherCall,
            MessageKey::ParticipantInCall,
            MessageKey::RoomNotFound,
            MessageKey::RoomNotActive,
            MessageKey::RoomFull,
            MessageKey::ParticipantNotFound,
            MessageKey::ParticipantNotInvited,
            MessageKey::InternalError,
        ];
        for lang in SUPPORTED_LANGUAGES {
            for key in keys {
                assert!(
                    lookup(lang, key).is_some(),
                    "missing {key:?} for {lang}"
                );
            }
        }
    }
}
