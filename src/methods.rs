// Method map: semantic API names resolved to the opaque short ids carried on
// the wire. The gateway has no path component besides the id, so an unknown
// name is a hard error rather than a fallback route.

use ahash::AHashMap;
use thiserror::Error;

/// Errors returned by method resolution.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MethodMapError {
    /// The name has no wire id registered.
    #[error("method '{0}' not found in mapping table")]
    Unknown(String),
}

/// Mapping from semantic method names to opaque wire ids.
#[derive(Debug, Clone)]
pub struct MethodMap {
    entries: AHashMap<String, String>,
}

impl MethodMap {
    /// Creates a map from explicit entries.
    pub fn new<N, I>(entries: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, N)>,
    {
        let entries = entries
            .into_iter()
            .map(|(name, id)| (name.into(), id.into()))
            .collect();
        Self { entries }
    }

    /// Resolves a method name to its wire id.
    pub fn resolve(&self, name: &str) -> Result<&str, MethodMapError> {
        self.entries
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| MethodMapError::Unknown(name.to_string()))
    }

    /// Registers or replaces a single entry.
    pub fn insert(&mut self, name: impl Into<String>, id: impl Into<String>) {
        self.entries.insert(name.into(), id.into());
    }

    /// Number of registered methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no methods are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MethodMap {
    fn default() -> Self {
        Self::new(DEFAULT_METHODS.iter().copied())
    }
}

/// Production mapping table shipped with the client.
pub const DEFAULT_METHODS: &[(&str, &str)] = &[
    // Long video categories.
    ("long_video_category", "b2c3d4"),
    ("long_video_category_videos", "b3c4d5"),
    // Long video.
    ("long_video_h5_list", "g8h9i0"),
    ("long_video_h5_detail", "h9i0j1"),
    ("long_video_play", "i0j1k2"),
    ("long_video_all", "j1k2l3"),
    ("long_video_guess_you_like", "k2l3m4"),
    ("long_video_track", "l3m4n5"),
    ("long_video_rank", "m4n5o6"),
    ("long_video_limited_free", "n5o6p7"),
    ("long_video_tag_list", "lt1g2h"),
    // Anime.
    ("anime_category_list", "o6p7q8"),
    ("anime_category_group", "p7q8r9"),
    ("anime_sub_animes", "q8r9s0"),
    ("anime_video_list", "r9s0t1"),
    ("anime_recommend_all", "s0t1u2"),
    ("anime_recommend_groups", "t1u2v3"),
    ("anime_tags", "u2v3w4"),
    // H5 long video.
    ("h5_long_home", "c3d4e5"),
    ("h5_long_video_detail", "d4e5f6"),
    ("h5_long_group_videos", "e5f6g7"),
    // Banners.
    ("banner_list", "f7g8h9"),
    // Search.
    ("search_hot_keywords", "s1h2k3"),
    // Popup configuration.
    ("popup_config", "p1c2f3"),
    // Audio novels.
    ("audio_novel_category_list", "a1b2c3"),
    ("audio_novel_list", "a2b3c4"),
    ("audio_novel_detail", "a3b4c5"),
    ("audio_novel_chapter_list", "a4b5c6"),
    ("audio_novel_chapter_detail", "a5b6c7"),
    ("audio_novel_chapter_play", "a6b7c8"),
    ("audio_novel_tag_list", "a7b8c9"),
    ("audio_recommend_all_groups", "a8b9c1"),
    ("audio_recommend_group_audios", "a9b1c2"),
    // Text novels.
    ("text_novel_category_list", "tn1a2b"),
    ("text_novel_list", "tn2b3c"),
    ("text_novel_detail", "tn3c4d"),
    ("text_novel_chapter_list", "tn4d5e"),
    ("text_novel_chapter_detail", "tn5e6f"),
    ("text_novel_recommend_all_groups", "tn6f7g"),
    ("text_novel_recommend_group_novels", "tn7g8h"),
    ("text_novel_tag_list", "tn8h9i"),
    // Browse history.
    ("browse_history_list", "b1c2d3"),
    ("browse_history_all_types", "b9c8d7"),
    ("browse_history_add", "b4c5d6"),
    ("browse_history_delete", "b7d8e9"),
    // Coin packages.
    ("coin_package_list", "c1o2i3"),
    ("coin_package_add", "c2o3i4"),
    ("coin_package_update", "c3o4i5"),
    ("coin_package_delete", "c4o5i6"),
    ("coin_package_status", "c5o6i7"),
    // User.
    ("user_login", "u1a2b3"),
    ("user_register", "u2a3b4"),
    ("user_info", "u3a4b5"),
    ("user_auto_register", "u4a5b6"),
    ("user_task_status", "u5a6b7"),
    ("user_claim_task", "u6a7b8"),
    ("long_video_can_watch", "u7a8b9"),
    // Points exchange.
    ("points_exchange_list", "pe1l2t"),
    ("points_exchange", "pe2e3g"),
    ("points_exchange_records", "pe3r4d"),
    // VIP cards.
    ("vip_card_list", "vip1l2t"),
    ("vip_card_save", "vip2s3v"),
    ("vip_card_update", "vip3u4p"),
    ("vip_card_toggle_status", "vip4t5s"),
    ("vip_card_delete", "vip5d6l"),
    ("vip_card_all", "vip6a7l"),
    // OnlyFans front end.
    ("onlyfans_categories", "of1c2a"),
    ("onlyfans_creators_by_category", "of2c3b"),
    ("onlyfans_creator_detail", "of3c4d"),
    ("onlyfans_creator_profile", "of4c5p"),
    ("onlyfans_creator_media", "of5c6m"),
    ("onlyfans_media_detail", "of6m7d"),
    ("onlyfans_media_images", "of7m8i"),
    ("onlyfans_search", "of8s9r"),
    // Comic categories.
    ("comic_category_list", "cm1a2b"),
    ("comic_category_add", "cm2b3c"),
    ("comic_category_update", "cm3c4d"),
    ("comic_category_delete", "cm4d5e"),
    ("comic_category_batch_delete", "cm5e6f"),
    ("comic_category_toggle_status", "cm6f7g"),
    ("comic_category_batch_set_status", "cm7g8h"),
    // Comic content.
    ("comic_detail", "cm8h9i"),
    ("comic_chapters", "cm9i0j"),
    ("comic_chapter_detail", "cm0j1k"),
    ("comic_chapter_images", "cm1k2l"),
    ("comic_manga_list", "cm2l3m"),
    // Alias kept so either name resolves to the same wire id.
    ("comic_list", "cm2l3m"),
    // Comic recommendation groups.
    ("comic_recommend_groups", "cm3m4n"),
    ("comic_recommend_group_add", "cm4n5o"),
    ("comic_recommend_group_update", "cm5o6p"),
    ("comic_recommend_group_delete", "cm6p7q"),
    ("comic_recommend_groups_sort", "cm7q8r"),
    ("comic_recommend_group_comics", "cm8r9s"),
    ("comic_recommend_group_comics_save", "cm9s0t"),
    // Comic recommendation pools.
    ("comic_ungrouped_comics", "cm0t1u"),
    ("comic_all_comics", "cm1u2v"),
    ("comic_main_recommend_categories", "cm2v3w"),
    ("comic_child_recommend_categories", "cm3w4x"),
    ("comic_all_recommend_groups_with_comics", "cm4x5y"),
    ("comic_sub_category_comics", "cm5y6z"),
    // Comic tags and rankings.
    ("comic_tag_list", "cm6z7a"),
    ("comic_rank_list", "cm7a8b"),
    ("comic_daily_updates", "cm8b9c"),
    ("comic_weekly_updates", "cm9c0d"),
    ("comic_weekly_all_updates", "cm0d1e"),
    // Short video.
    ("douyin_video_h5_list", "dv1h2l"),
    ("douyin_video_play", "dv3p4y"),
    ("douyin_tag_all", "dt7a8l"),
    ("douyin_video_discover", "dv4d5c"),
    ("douyin_video_h5_detail", "dv5h6d"),
    ("douyin_video_search", "dv6s7h"),
    // Short video keywords.
    ("douyin_keywords_enabled", "dk1e2n"),
    ("douyin_keywords_random", "dk2r3d"),
    ("douyin_keyword_click", "dk3c4k"),
    ("douyin_keyword_display", "dk4d5p"),
    ("douyin_keywords_list", "dk5l6t"),
    // Darknet vertical.
    ("darknet_home", "dn1h2m"),
    ("darknet_group_videos", "dn2g3v"),
    ("darknet_categories_list", "dn3c4l"),
    ("darknet_videos_h5_list", "dn4v5h"),
    ("darknet_category_videos", "dn5c6v"),
    // User actions.
    ("user_like", "ua1l2k"),
    ("user_unlike", "ua2u3k"),
    ("user_collect", "ua3c4t"),
    ("user_uncollect", "ua4u5t"),
    ("user_action_status", "ua5a6s"),
    ("user_batch_action_status", "ua6b7s"),
    ("user_collections", "ua7c8s"),
    // Unlock system.
    ("unlock_long_video", "ul1l2v"),
    ("unlock_darknet_video", "ul2d3v"),
    ("unlock_anime_video", "ul3a4v"),
    ("unlock_star_video", "ul4s5v"),
    ("unlock_douyin_video", "ul5d6v"),
    ("unlock_comic_chapter", "ul6c7h"),
    ("unlock_comic_whole", "ul7c8w"),
    ("unlock_novel_chapter", "ul8n9h"),
    ("unlock_novel_whole", "ul9n0w"),
    ("unlock_audio_novel_chapter", "ul0a1h"),
    ("unlocked_chapters", "ul1u2c"),
    ("unlocked_novel_chapters", "ul2u3c"),
    ("unlocked_audio_novel_chapters", "ul3u4c"),
];
