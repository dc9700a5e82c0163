use std::io::{self, BufRead, Write};

use anyhow::Result;
use rand::Rng;
use scorelabel_core::error::Error;
use scorelabel_core::planner::Strategy;
use scorelabel_core::session::{ReviewInput, ReviewSession};
use scorelabel_core::Curator;

const PROMPT: &str = "  label [0-9 | value], n(ext), p(rev), q(uit) > ";

/// Walk the session until it terminates, reading one decision per line from
/// `input`. End of input quits.
pub(crate) fn drive<R, B, W>(session: &mut ReviewSession<R>, input: B, out: &mut W) -> Result<()>
where
    R: Rng,
    B: BufRead,
    W: Write,
{
    let mut lines = input.lines();
    session.start()?;

    while !session.is_finished() {
        let shown = session.present()?;
        writeln!(out)?;
        writeln!(
            out,
            "  [{}/{}] {}",
            shown.index + 1,
            shown.total,
            shown.item.image_path.display()
        )?;
        writeln!(out, "  {}", shown.caption())?;

        loop {
            write!(out, "{PROMPT}")?;
            out.flush()?;
            let Some(line) = lines.next() else {
                writeln!(out)?;
                session.handle(ReviewInput::Quit)?;
                break;
            };
            match session.handle_raw(&line?) {
                Ok(_) => break,
                Err(Error::InvalidLabelInput(text)) => {
                    writeln!(out, "  not a label or command: {text}")?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(())
}

pub fn run(curator: Curator, strategy: Strategy) -> Result<()> {
    let mut session = curator.into_session(strategy);
    println!();
    println!(
        "  Reviewing {} images ({strategy}), store {}",
        session.order().len(),
        session.store_path().display()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    drive(&mut session, stdin.lock(), &mut stdout)?;

    let committed = session.committed();
    let snapshots = session.snapshots();
    let store = session.finish()?;

    println!();
    println!(
        "  Labeled {committed} images this session ({} total), {snapshots} backups taken.",
        store.count_labeled()
    );
    println!();
    Ok(())
}
