//! Fixed phrase pools used by the style adjuster.

/// Generic adjectives removed by the minimal detail level.
pub const STOPLIST: [&str; 7] = [
    "beautiful",
    "stunning",
    "amazing",
    "incredible",
    "gorgeous",
    "lovely",
    "wonderful",
];

/// Pool for the detailed level; two are picked per call.
pub const DETAIL_PHRASES: [&str; 6] = [
    "with intricate details",
    "featuring rich textures",
    "showcasing fine craftsmanship",
    "with careful attention to lighting",
    "displaying vibrant color palette",
    "with artistic composition",
];

pub const TECHNICAL_PHRASES: [&str; 4] = [
    "shot with professional camera equipment",
    "using optimal lighting conditions",
    "with precise focus and depth of field",
    "featuring balanced exposure and contrast",
];

pub const ARTISTIC_PHRASES: [&str; 4] = [
    "following rule of thirds composition",
    "with harmonious color grading",
    "showcasing artistic perspective",
    "demonstrating creative vision",
];

pub const QUALITY_PHRASES: [&str; 4] = [
    "ultra-high resolution",
    "museum quality",
    "gallery worthy",
    "award winning photography",
];

/// Appended in this order until a length target's minimum is met.
pub const EXPANSION_PHRASES: [&str; 7] = [
    "with professional quality and attention to detail",
    "featuring excellent composition and visual appeal",
    "showcasing remarkable clarity and sharpness",
    "displaying exceptional artistic merit",
    "captured with perfect timing and technique",
    "demonstrating mastery of lighting and perspective",
    "with impeccable framing and visual balance",
];

/// Quality boosters for Flux prompts; three are picked per call.
pub const FLUX_PHRASES: [&str; 9] = [
    "highly detailed",
    "cinematic lighting",
    "ultra realistic",
    "4k resolution",
    "professional photography",
    "sharp focus",
    "vivid colors",
    "masterpiece",
    "best quality",
];
