use regex::Regex;
use lazy_static::lazy_static;

lazy_static! {
    static ref RACK_ID_REGEX: Regex = Regex::new(r"rack(\d+)").expect("bad regex for RACK_ID_REGEX");
}

///
/// Which of the three CSV layouts a member holds.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberKind {
    Summary,
    BatVol,
    BatTemp,
}

///
/// Where a member's data belongs in the day aggregate.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RackRef {
    Bank,
    Rack(u32),
    Unknown,
}

///
/// Classify an archive member by its basename, case-insensitively, in priority
/// order summary > batvol > battemp. Non-CSV members and anything matching none
/// of the patterns are ignored (None).
///
pub fn classify(member_name: &str) -> Option<(MemberKind, RackRef)> {
    let name = basename(member_name).to_lowercase();

    if !name.ends_with(".csv") {
        return None
    }

    let kind = if name.contains("summary") {
        MemberKind::Summary
    } else if name.contains("batvol") || name.contains("bat_vol") {
        MemberKind::BatVol
    } else if name.contains("battemp") || name.contains("bat_temp") {
        MemberKind::BatTemp
    } else {
        return None
    };

    Some((kind, rack_ref(&name, kind)))
}

///
/// Bank wins over a rack number for summaries (a bank summary names the whole
/// stack). Voltage and temperature members always belong to a rack, so a bank
/// marker without a rack number leaves them unattributable.
///
fn rack_ref(name: &str, kind: MemberKind) -> RackRef {
    if kind == MemberKind::Summary && name.contains("bank") {
        return RackRef::Bank
    }

    match RACK_ID_REGEX.captures(name) {
        Some(captures) => {
            match captures.get(1).expect("rack capture missing").as_str().parse() {
                Ok(id) => RackRef::Rack(id),
                Err(_) => RackRef::Unknown, // Digit run too long for a u32.
            }
        },
        None => RackRef::Unknown,
    }
}

fn basename(member_name: &str) -> &str {
    member_name.rsplit('/').next().unwrap_or(member_name)
}
