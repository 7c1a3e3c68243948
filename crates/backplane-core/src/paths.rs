//! Deterministic blob-store paths (spec.md §6, "Persisted layout in blob
//! store"). Centralizing these ensures two claimants racing on a
//! redelivered job converge on the same byte layout (spec.md §5, §8
//! idempotency invariant).

pub fn original_source(code: &str, ext: &str) -> String {
    format!("videos/{code}/original.{ext}")
}

pub fn hls_master(code: &str) -> String {
    format!("hls/{code}/master.m3u8")
}

pub fn hls_rung_playlist(code: &str, rung: &str) -> String {
    format!("hls/{code}/{rung}/playlist.m3u8")
}

pub fn hls_segment(code: &str, rung: &str, seq: u32) -> String {
    format!("hls/{code}/{rung}/segment_{seq:03}.ts")
}

pub fn hls_h264_fallback_master(code: &str) -> String {
    format!("hls/{code}/h264/master.m3u8")
}

pub fn hls_audio(code: &str) -> String {
    format!("hls/{code}/audio.wav")
}

pub fn subtitle_srt(code: &str, lang: &str) -> String {
    format!("subtitles/{code}/{lang}.srt")
}

pub fn gallery_source(code: &str, seq: u32) -> String {
    format!("gallery/{code}/source/{seq:03}.jpg")
}

pub fn gallery_tier(code: &str, tier: &str, seq: u32) -> String {
    format!("gallery/{code}/{tier}/{seq:03}.jpg")
}

pub fn reel_output(reel_id: &str) -> String {
    format!("reels/{reel_id}/output.mp4")
}

pub fn reel_thumb(reel_id: &str) -> String {
    format!("reels/{reel_id}/thumb.jpg")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_match_spec_layout() {
        assert_eq!(hls_master("abc"), "hls/abc/master.m3u8");
        assert_eq!(hls_rung_playlist("abc", "720p"), "hls/abc/720p/playlist.m3u8");
        assert_eq!(hls_segment("abc", "720p", 7), "hls/abc/720p/segment_007.ts");
        assert_eq!(hls_h264_fallback_master("abc"), "hls/abc/h264/master.m3u8");
        assert_eq!(hls_audio("abc"), "hls/abc/audio.wav");
        assert_eq!(subtitle_srt("abc", "fr"), "subtitles/abc/fr.srt");
        assert_eq!(gallery_source("abc", 3), "gallery/abc/source/003.jpg");
        assert_eq!(gallery_tier("abc", "super_safe", 3), "gallery/abc/super_safe/003.jpg");
        assert_eq!(reel_output("r1"), "reels/r1/output.mp4");
    }

    #[test]
    fn paths_are_deterministic_across_calls() {
        assert_eq!(hls_segment("abc", "1080p", 1), hls_segment("abc", "1080p", 1));
    }
}
