// Lua 5.3 string patterns, backing string.find/match/gmatch/gsub.
//
// Pattern syntax:
// - Character classes: ., %a, %c, %d, %g, %l, %p, %s, %u, %w, %x (uppercase negates)
// - Character sets: [set], [^set], with ranges
// - Repetitions: * + - ?
// - Captures: (pattern), position captures ()
// - Anchors: ^, $
// - Balanced %bxy, frontier %f[set], back-references %1-%9

mod matcher;

pub use matcher::{Capture, MatchResult, PatternError, first_match};
