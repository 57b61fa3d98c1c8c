use std::sync::OnceLock;

/// Merchant and biller names (lowercase) mapped to a category. Holds no
/// salary words: payroll is recognized from the transfer narrative by the
/// pattern stage.
pub const KEYWORDS: &[(&str, &str)] = &[
    // groceries
    ("esselunga", "groceries"),
    ("conad", "groceries"),
    ("coop alleanza", "groceries"),
    ("ipercoop", "groceries"),
    ("carrefour", "groceries"),
    ("lidl", "groceries"),
    ("eurospin", "groceries"),
    ("aldi", "groceries"),
    ("penny market", "groceries"),
    ("despar", "groceries"),
    ("famila", "groceries"),
    ("bennet", "groceries"),
    ("tesco", "groceries"),
    ("sainsbury", "groceries"),
    ("supermercato", "groceries"),
    ("supermarket", "groceries"),
    // restaurants & bars
    ("ristorante", "restaurants"),
    ("restaurant", "restaurants"),
    ("trattoria", "restaurants"),
    ("pizzeria", "restaurants"),
    ("osteria", "restaurants"),
    ("mcdonald", "restaurants"),
    ("burger king", "restaurants"),
    ("starbucks", "restaurants"),
    ("autogrill", "restaurants"),
    // food delivery
    ("deliveroo", "food_delivery"),
    ("just eat", "food_delivery"),
    ("glovo", "food_delivery"),
    ("uber eats", "food_delivery"),
    // subscriptions
    ("netflix", "subscriptions"),
    ("spotify", "subscriptions"),
    ("disney plus", "subscriptions"),
    ("disney+", "subscriptions"),
    ("amazon prime", "subscriptions"),
    ("prime video", "subscriptions"),
    ("youtube premium", "subscriptions"),
    ("apple.com/bill", "subscriptions"),
    ("dazn", "subscriptions"),
    ("now tv", "subscriptions"),
    // shopping & electronics
    ("amazon", "shopping"),
    ("zalando", "shopping"),
    ("ebay", "shopping"),
    ("aliexpress", "shopping"),
    ("mediaworld", "electronics"),
    ("unieuro", "electronics"),
    ("euronics", "electronics"),
    ("apple store", "electronics"),
    ("decathlon", "sports"),
    ("ikea", "home"),
    ("leroy merlin", "home"),
    ("brico", "home"),
    ("zara", "clothing"),
    ("h&m", "clothing"),
    ("primark", "clothing"),
    ("ovs", "clothing"),
    // health
    ("farmacia", "health"),
    ("pharmacy", "health"),
    ("parafarmacia", "health"),
    ("ospedale", "health"),
    ("dentista", "health"),
    ("poliambulatorio", "health"),
    // transport & fuel
    ("trenitalia", "transport"),
    ("italo spa", "transport"),
    ("atm milano", "transport"),
    ("uber", "transport"),
    ("free now", "transport"),
    ("ryanair", "travel"),
    ("easyjet", "travel"),
    ("ita airways", "travel"),
    ("booking.com", "travel"),
    ("airbnb", "travel"),
    ("expedia", "travel"),
    ("eni station", "fuel"),
    ("enilive", "fuel"),
    ("q8", "fuel"),
    ("tamoil", "fuel"),
    ("esso", "fuel"),
    ("ip station", "fuel"),
    // utilities & telecom
    ("enel", "utilities"),
    ("iren", "utilities"),
    ("a2a", "utilities"),
    ("hera comm", "utilities"),
    ("acea", "utilities"),
    ("sorgenia", "utilities"),
    ("edison energia", "utilities"),
    ("italgas", "utilities"),
    ("octopus energy", "utilities"),
    ("vodafone", "telecom"),
    ("windtre", "telecom"),
    ("wind tre", "telecom"),
    ("iliad", "telecom"),
    ("fastweb", "telecom"),
    ("tim spa", "telecom"),
    ("telecom italia", "telecom"),
    ("ho. mobile", "telecom"),
    // leisure
    ("cinema", "entertainment"),
    ("ticketone", "entertainment"),
    ("steam", "entertainment"),
    ("playstation", "entertainment"),
    ("palestra", "sports"),
    ("gym", "sports"),
];

/// Keywords ordered longest first, ties broken alphabetically, so the most
/// specific phrase is tried before any shorter substring of it.
pub fn by_length() -> &'static [(&'static str, &'static str)] {
    static SORTED: OnceLock<Vec<(&'static str, &'static str)>> = OnceLock::new();
    SORTED.get_or_init(|| {
        let mut sorted = KEYWORDS.to_vec();
        sorted.sort_by(|a, b| {
            b.0.chars()
                .count()
                .cmp(&a.0.chars().count())
                .then_with(|| a.0.cmp(b.0))
        });
        sorted
    })
}

/// Keywords this short only match as a whole word: "iren" must not fire
/// on "firenze", nor "esso" on "accesso".
const WHOLE_WORD_MAX_CHARS: usize = 4;

/// Whether `keyword` occurs in the lowercased `text`.
pub fn matches(text: &str, keyword: &str) -> bool {
    if keyword.chars().count() > WHOLE_WORD_MAX_CHARS {
        return text.contains(keyword);
    }
    text.match_indices(keyword).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + keyword.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
