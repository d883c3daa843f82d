//! Media Handlers module for processing photo, voice, and text meal input

use anyhow::{bail, Result};
use teloxide::prelude::*;
use teloxide::types::FileId;
use tracing::{debug, info, warn};

use crate::analysis::AnalysisInput;
use crate::config::MAX_DOWNLOAD_SIZE;
use crate::db;
use crate::errors::error_logging;
use crate::observability;
use crate::texts;

use super::analysis_flow;
use super::AppContext;

/// Download a file uploaded to Telegram into memory
///
/// The Content-Length header is checked first so an oversized upload is
/// rejected before any bytes are pulled.
pub async fn download_file(bot: &Bot, file_id: FileId) -> Result<Vec<u8>> {
    let file = bot.get_file(file_id).await?;
    let url = format!(
        "https://api.telegram.org/file/bot{}/{}",
        bot.token(),
        file.path
    );

    let response = reqwest::get(&url).await?;

    if let Some(content_length) = response.content_length() {
        if content_length > MAX_DOWNLOAD_SIZE {
            bail!(
                "File too large: {} bytes (maximum allowed: {} bytes)",
                content_length,
                MAX_DOWNLOAD_SIZE
            );
        }
    }

    let bytes = response.bytes().await?;
    debug!(size = bytes.len(), "Telegram file downloaded");
    Ok(bytes.to_vec())
}

/// Handle photo messages: upload to object storage, then vision analysis
pub async fn handle_photo_message(
    bot: &Bot,
    msg: &Message,
    ctx: &AppContext,
    user: &db::User,
) -> Result<()> {
    let Some(largest_photo) = msg.photo().and_then(<[_]>::last) else {
        return Ok(());
    };

    debug!(user_id = %user.id, "Received photo message");
    observability::record_telegram_message("photo");
    bot.send_message(msg.chat.id, texts::PHOTO_RECEIVED).await?;

    let bytes = match download_file(bot, largest_photo.file.id.clone()).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error_logging::log_telegram_error(
                &e,
                "download_photo",
                Some(msg.chat.id.0),
                Some(msg.id.0),
            );
            bot.send_message(msg.chat.id, texts::ANALYSIS_FAILED).await?;
            return Ok(());
        }
    };

    let photo = match ctx.storage.upload_photo(user.id, bytes).await {
        Ok(photo) => photo,
        Err(e) => {
            error_logging::log_storage_error(&e, "upload_photo", Some(user.id), None, None);
            bot.send_message(msg.chat.id, texts::ANALYSIS_FAILED).await?;
            return Ok(());
        }
    };

    info!(user_id = %user.id, key = %photo.key, "Meal photo uploaded");

    analysis_flow::analyze_and_report(
        bot,
        msg.chat.id,
        ctx,
        user,
        AnalysisInput::Photo {
            image_url: photo.url,
        },
        Some(photo.key),
    )
    .await
}

/// Handle voice messages: transcribe, then analyze the transcript
pub async fn handle_voice_message(
    bot: &Bot,
    msg: &Message,
    ctx: &AppContext,
    user: &db::User,
) -> Result<()> {
    let Some(voice) = msg.voice() else {
        return Ok(());
    };

    debug!(user_id = %user.id, duration = ?voice.duration, "Received voice message");
    observability::record_telegram_message("voice");
    bot.send_message(msg.chat.id, texts::VOICE_RECEIVED).await?;

    let transcript = match transcribe_voice(bot, ctx, voice.file.id.clone()).await {
        Ok(Some(transcript)) => transcript,
        Ok(None) => {
            bot.send_message(msg.chat.id, texts::VOICE_EMPTY).await?;
            return Ok(());
        }
        Err(e) => {
            error_logging::log_analysis_error(&e, "transcribe_voice", Some(user.id), "voice", None);
            bot.send_message(msg.chat.id, texts::ANALYSIS_FAILED).await?;
            return Ok(());
        }
    };

    analysis_flow::analyze_and_report(
        bot,
        msg.chat.id,
        ctx,
        user,
        AnalysisInput::Text {
            description: transcript,
        },
        None,
    )
    .await
}

/// Handle free-text meal descriptions
pub async fn handle_text_message(
    bot: &Bot,
    msg: &Message,
    ctx: &AppContext,
    user: &db::User,
    text: &str,
) -> Result<()> {
    observability::record_telegram_message("text");
    bot.send_message(msg.chat.id, texts::TEXT_RECEIVED).await?;

    analysis_flow::analyze_and_report(
        bot,
        msg.chat.id,
        ctx,
        user,
        AnalysisInput::Text {
            description: text.to_string(),
        },
        None,
    )
    .await
}

/// Download a voice message and run it through transcription.
///
/// Returns `Ok(None)` when the recording contained no recognizable speech.
pub async fn transcribe_voice(
    bot: &Bot,
    ctx: &AppContext,
    file_id: FileId,
) -> Result<Option<String>> {
    let audio = download_file(bot, file_id).await?;
    let transcript = ctx.analysis.transcribe_voice(audio, "voice.ogg").await?;

    if transcript.is_empty() {
        warn!("Voice transcription returned empty text");
        return Ok(None);
    }

    debug!(chars = transcript.len(), "Voice message transcribed");
    Ok(Some(transcript))
}
