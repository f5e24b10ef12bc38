// Legacy genre table
//
// The single-byte genre numbering from ID3v1 plus the Winamp extensions.
// Ids 0..=125 are the standard range that MP4 `gnre` atoms may reference;
// the rest are only resolved by name.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Highest id the legacy numeric genre atom may carry
pub const MAX_STANDARD_GENRE_ID: u16 = 125;

const GENRES: [&str; 192] = [
    "Blues",
    "Classic Rock",
    "Country",
    "Dance",
    "Disco",
    "Funk",
    "Grunge",
    "Hip-Hop",
    "Jazz",
    "Metal",
    "New Age",
    "Oldies",
    "Other",
    "Pop",
    "R&B",
    "Rap",
    "Reggae",
    "Rock",
    "Techno",
    "Industrial",
    "Alternative",
    "Ska",
    "Death Metal",
    "Pranks",
    "Soundtrack",
    "Euro-Techno",
    "Ambient",
    "Trip-Hop",
    "Vocal",
    "Jazz+Funk",
    "Fusion",
    "Trance",
    "Classical",
    "Instrumental",
    "Acid",
    "House",
    "Game",
    "Sound Clip",
    "Gospel",
    "Noise",
    "AlternRock",
    "Bass",
    "Soul",
    "Punk",
    "Space",
    "Meditative",
    "Instrumental Pop",
    "Instrumental Rock",
    "Ethnic",
    "Gothic",
    "Darkwave",
    "Techno-Industrial",
    "Electronic",
    "Pop-Folk",
    "Eurodance",
    "Dream",
    "Southern Rock",
    "Comedy",
    "Cult",
    "Gangsta",
    "Top 40",
    "Christian Rap",
    "Pop/Funk",
    "Jungle",
    "Native American",
    "Cabaret",
    "New Wave",
    "Psychadelic",
    "Rave",
    "Showtunes",
    "Trailer",
    "Lo-Fi",
    "Tribal",
    "Acid Punk",
    "Acid Jazz",
    "Polka",
    "Retro",
    "Musical",
    "Rock & Roll",
    "Hard Rock",
    "Folk",
    "Folk-Rock",
    "National Folk",
    "Swing",
    "Fast Fusion",
    "Bebob",
    "Latin",
    "Revival",
    "Celtic",
    "Bluegrass",
    "Avantgarde",
    "Gothic Rock",
    "Progressive Rock",
    "Psychedelic Rock",
    "Symphonic Rock",
    "Slow Rock",
    "Big Band",
    "Chorus",
    "Easy Listening",
    "Acoustic",
    "Humour",
    "Speech",
    "Chanson",
    "Opera",
    "Chamber Music",
    "Sonata",
    "Symphony",
    "Booty Bass",
    "Primus",
    "Porn Groove",
    "Satire",
    "Slow Jam",
    "Club",
    "Tango",
    "Samba",
    "Folklore",
    "Ballad",
    "Power Ballad",
    "Rhythmic Soul",
    "Freestyle",
    "Duet",
    "Punk Rock",
    "Drum Solo",
    "A capella",
    "Euro-House",
    "Dance Hall",
    "Goa",
    "Drum & Bass",
    "Club-House",
    "Hardcore",
    "Terror",
    "Indie",
    "BritPop",
    "Afro-Punk",
    "Polsk Punk",
    "Beat",
    "Christian Gangsta Rap",
    "Heavy Metal",
    "Black Metal",
    "Crossover",
    "Contemporary Christian",
    "Christian Rock",
    "Merengue",
    "Salsa",
    "Thrash Metal",
    "Anime",
    "JPop",
    "Synthpop",
    "Abstract",
    "Art Rock",
    "Baroque",
    "Bhangra",
    "Big Beat",
    "Breakbeat",
    "Chillout",
    "Downtempo",
    "Dub",
    "EBM",
    "Eclectic",
    "Electro",
    "Electroclash",
    "Emo",
    "Experimental",
    "Garage",
    "Global",
    "IDM",
    "Illbient",
    "Industro-Goth",
    "Jam Band",
    "Krautrock",
    "Leftfield",
    "Lounge",
    "Math Rock",
    "New Romantic",
    "Nu-Breakz",
    "Post-Punk",
    "Post-Rock",
    "Psytrance",
    "Shoegaze",
    "Space Rock",
    "Trop Rock",
    "World Music",
    "Neoclassical",
    "Audiobook",
    "Audio Theatre",
    "Neue Deutsche Welle",
    "Podcast",
    "Indie Rock",
    "G-Funk",
    "Dubstep",
    "Garage Rock",
    "Psybient",
];

/// Lowercased name -> id, built on first lookup and never changed after
static GENRE_IDS: Lazy<HashMap<String, u16>> = Lazy::new(|| {
    GENRES
        .iter()
        .enumerate()
        .map(|(id, name)| (name.to_lowercase(), id as u16))
        .collect()
});

/// Display name for a legacy id
pub fn genre_name(id: u16) -> Option<&'static str> {
    GENRES.get(id as usize).copied()
}

/// Legacy id for a display name, ignoring case
pub fn genre_id(name: &str) -> Option<u16> {
    GENRE_IDS.get(&name.trim().to_lowercase()).copied()
}

/// Every (id, name) pair in table order
pub fn genres() -> impl Iterator<Item = (u16, &'static str)> {
    GENRES.iter().enumerate().map(|(id, name)| (id as u16, *name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_both_ways() {
        assert_eq!(genre_name(0), Some("Blues"));
        assert_eq!(genre_name(17), Some("Rock"));
        assert_eq!(genre_name(MAX_STANDARD_GENRE_ID), Some("Dance Hall"));
        assert_eq!(genre_name(191), Some("Psybient"));
        assert_eq!(genre_name(192), None);

        assert_eq!(genre_id("rock"), Some(17));
        assert_eq!(genre_id(" Hip-Hop "), Some(7));
        assert_eq!(genre_id("Not A Genre"), None);
    }

    #[test]
    fn test_table_is_consistent() {
        assert_eq!(genres().count(), 192);
        for (id, name) in genres() {
            assert_eq!(genre_id(name), Some(id));
        }
    }
}
