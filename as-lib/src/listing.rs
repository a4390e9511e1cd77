use crate::assembler::Assembly;

/// One emitted word's worth of listing: where it landed, what it assembled
/// to (None when the statement errored), and the source it came from.
#[derive(Debug, Clone)]
pub struct ListingLine {
    pub addr: u16,
    pub word: Option<u16>,
    pub line_no: usize,
    pub text: String,
}

/// Columnar listing: address, assembled word, source statement, then a
/// totals line and any collected errors.
pub fn render(assembly: &Assembly) -> String {
    let mut out = String::new();
    for line in &assembly.lines {
        match line.word {
            Some(word) => out.push_str(&format!("{:04o} {word:04o}  {}\n", line.addr, line.text)),
            None => out.push_str(&format!("{:04o} ????  {}\n", line.addr, line.text)),
        }
    }

    out.push_str(&format!(
        "\n{} words, {} symbols, {} errors\n",
        assembly.words.len(),
        assembly.symbols.len(),
        assembly.errors.len()
    ));
    for err in &assembly.errors {
        out.push_str(&format!("{err}\n"));
    }
    out
}
