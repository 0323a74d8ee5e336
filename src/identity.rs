use rand::{thread_rng, Rng};

/// Generate a throwaway display name: {adjective}{noun}{number}
pub fn random_nickname() -> String {
    let adjectives = [
        "quiet", "sunny", "brisk", "amber", "lucky", "mellow", "nimble", "rusty", "silver",
        "swift", "witty", "cosmic", "gentle", "rapid", "lunar", "solar",
    ];

    let nouns = [
        "otter", "falcon", "badger", "heron", "lynx", "marten", "owl", "pike", "raven",
        "stoat", "wren", "finch", "hare", "moth", "newt", "vole",
    ];

    let mut rng = thread_rng();
    let adjective = adjectives[rng.gen_range(0..adjectives.len())];
    let noun = nouns[rng.gen_range(0..nouns.len())];
    let number: u16 = rng.gen_range(100..1000);

    format!("{}{}{}", adjective, noun, number)
}
