use crate::project::{Emotion, Segment, VoiceConfig, fallback_emotion};

/// Synthesis parameters chosen for one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedVoice {
    /// Empty when the speaker has no mapping; the backend then uses its default.
    pub voice_ref: String,
    pub emotion: Emotion,
    pub speed: f32,
}

/// Pick voice, emotion and speed for `segment` from its speaker's mapping.
///
/// With analysis emotion enabled the segment's own emotion wins; otherwise
/// the mapping's default does. An unmapped speaker keeps the segment's
/// emotion. Anything still unset becomes calm.
pub fn resolve_voice(segment: &Segment, mapping: Option<&VoiceConfig>) -> ResolvedVoice {
    let Some(mapping) = mapping else {
        return ResolvedVoice {
            voice_ref: String::new(),
            emotion: segment.emotion.unwrap_or_else(fallback_emotion),
            speed: 1.0,
        };
    };

    let emotion = if mapping.use_analysis_emotion {
        segment.emotion
    } else {
        mapping.default_emotion
    };

    let voice_ref = if mapping.voice_ref.is_empty() {
        mapping.reference_audio_path.clone()
    } else {
        mapping.voice_ref.clone()
    };

    let speed = if mapping.speed.is_finite() && mapping.speed > 0.0 {
        mapping.speed
    } else {
        1.0
    };

    ResolvedVoice {
        voice_ref,
        emotion: emotion.unwrap_or_else(fallback_emotion),
        speed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(use_analysis: bool, default: Option<Emotion>) -> VoiceConfig {
        VoiceConfig {
            voice_ref: "ann.wav".to_string(),
            default_emotion: default,
            use_analysis_emotion: use_analysis,
            ..Default::default()
        }
    }

    #[test]
    fn test_unmapped_speaker_keeps_segment_emotion() {
        let segment = Segment::new("hi", "Ann", Some(Emotion::Sad));
        let resolved = resolve_voice(&segment, None);
        assert_eq!(resolved.voice_ref, "");
        assert_eq!(resolved.emotion, Emotion::Sad);
        assert_eq!(resolved.speed, 1.0);
    }

    #[test]
    fn test_unmapped_speaker_without_emotion_is_calm() {
        let segment = Segment::new("hi", "Ann", None);
        assert_eq!(resolve_voice(&segment, None).emotion, Emotion::Calm);
    }

    #[test]
    fn test_analysis_emotion_wins_when_enabled() {
        let segment = Segment::new("hi", "Ann", Some(Emotion::Angry));
        let resolved = resolve_voice(&segment, Some(&mapping(true, Some(Emotion::Happy))));
        assert_eq!(resolved.voice_ref, "ann.wav");
        assert_eq!(resolved.emotion, Emotion::Angry);
    }

    #[test]
    fn test_analysis_enabled_without_segment_emotion_is_calm() {
        let segment = Segment::new("hi", "Ann", None);
        let resolved = resolve_voice(&segment, Some(&mapping(true, Some(Emotion::Happy))));
        assert_eq!(resolved.emotion, Emotion::Calm);
    }

    #[test]
    fn test_mapping_default_used_when_analysis_disabled() {
        let segment = Segment::new("hi", "Ann", Some(Emotion::Angry));
        let resolved = resolve_voice(&segment, Some(&mapping(false, Some(Emotion::Happy))));
        assert_eq!(resolved.emotion, Emotion::Happy);

        let resolved = resolve_voice(&segment, Some(&mapping(false, None)));
        assert_eq!(resolved.emotion, Emotion::Calm);
    }

    #[test]
    fn test_reference_audio_fills_missing_voice_ref() {
        let segment = Segment::new("hi", "Ann", None);
        let config = VoiceConfig {
            reference_audio_path: "ref.wav".to_string(),
            speed: 1.25,
            ..Default::default()
        };
        let resolved = resolve_voice(&segment, Some(&config));
        assert_eq!(resolved.voice_ref, "ref.wav");
        assert_eq!(resolved.speed, 1.25);
    }

    #[test]
    fn test_invalid_speed_falls_back_to_normal() {
        let segment = Segment::new("hi", "Ann", None);
        let config = VoiceConfig {
            speed: 0.0,
            ..Default::default()
        };
        assert_eq!(resolve_voice(&segment, Some(&config)).speed, 1.0);
    }
}
