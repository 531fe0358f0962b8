//! Rule passes: binary reading, the finite-state matcher, and the driver
//! that applies matched rules to a segment.
//!
//! Each pass carries a compressed transition table. The matcher walks the
//! slot stream through it, mapping each slot's glyph to a column and
//! stepping `state ← T[state][column]`; rows are numbered with the dead
//! state at 0, transitional states first, and the accepting states last, so
//! `state >= num_rows - num_success` accumulates that state's candidate
//! rules. Candidates are then tried in (sort key, lowest rule id) order:
//! the first whose constraint program accepts has its action program run
//! against the matched window.

use log::warn;

use crate::binary::read::{ReadBinaryDep, ReadCtxt};
use crate::code::Code;
use crate::error::{CodeError, ParseError};
use crate::machine::{Machine, MachineStatus, RunContext, SlotMap};
use crate::segment::Segment;
use crate::slot::SlotRef;
use crate::tables::GlyphSource;
use crate::GlyphId;

/// One rule: its matcher metadata and its two programs.
#[derive(Debug)]
pub(crate) struct Rule {
    /// Length of the rule's context, precontext included. Longer rules win.
    sort_key: u16,
    /// Slots the rule requires before the match start.
    precontext: u8,
    constraint: Option<Code>,
    action: Option<Code>,
}

/// Glyph id range → transition column.
#[derive(Debug, Clone, Copy)]
struct ColumnRange {
    first: GlyphId,
    last: GlyphId,
    column: u16,
}

#[derive(Debug)]
pub struct Pass {
    #[allow(dead_code)]
    flags: u8,
    max_rule_loop: u8,
    max_backup: u8,
    rules: Vec<Rule>,
    num_rows: u16,
    num_transitional: u16,
    num_success: u16,
    num_columns: u16,
    /// Sorted, non-overlapping glyph ranges.
    ranges: Vec<ColumnRange>,
    /// `num_transitional × num_columns` next-state entries.
    transitions: Vec<u16>,
    /// `num_success + 1` offsets into `rule_map`.
    rule_map_offsets: Vec<u16>,
    rule_map: Vec<u16>,
    min_precontext: u8,
    max_precontext: u8,
    /// Start state per available precontext, indexed
    /// `max_precontext - available`.
    start_states: Vec<u16>,
    pass_constraint: Option<Code>,
    /// Set when a rule program failed to load; the pass never runs.
    disabled: Option<CodeError>,
}

impl<'a> ReadBinaryDep<'a> for Pass {
    type Args = ();
    type HostType = Pass;

    fn read_dep(ctxt: &mut ReadCtxt<'a>, (): ()) -> Result<Pass, ParseError> {
        let flags = ctxt.read_u8()?;
        let max_rule_loop = ctxt.read_u8()?;
        let max_backup = ctxt.read_u8()?;
        let num_rules = ctxt.read_u16be()?;
        let num_rows = ctxt.read_u16be()?;
        let num_transitional = ctxt.read_u16be()?;
        let num_success = ctxt.read_u16be()?;
        let num_columns = ctxt.read_u16be()?;

        if num_transitional > num_rows || num_success > num_rows {
            return Err(ParseError::BadValue);
        }

        let num_ranges = ctxt.read_u16be()?;
        let mut ranges = Vec::with_capacity(usize::from(num_ranges));
        for _ in 0..num_ranges {
            let first = ctxt.read_u16be()?;
            let last = ctxt.read_u16be()?;
            let column = ctxt.read_u16be()?;
            if first > last || column >= num_columns {
                return Err(ParseError::BadValue);
            }
            ranges.push(ColumnRange {
                first,
                last,
                column,
            });
        }
        ranges.sort_by_key(|r| r.first);
        if ranges.windows(2).any(|w| w[0].last >= w[1].first) {
            return Err(ParseError::BadValue);
        }

        let rule_map_offsets = ctxt.read_u16s(usize::from(num_success) + 1)?;
        if rule_map_offsets.windows(2).any(|w| w[0] > w[1]) {
            return Err(ParseError::BadValue);
        }
        let rule_map_len = usize::from(*rule_map_offsets.last().unwrap_or(&0));
        let rule_map = ctxt.read_u16s(rule_map_len)?;
        if rule_map.iter().any(|&rule| rule >= num_rules) {
            return Err(ParseError::BadValue);
        }

        let min_precontext = ctxt.read_u8()?;
        let max_precontext = ctxt.read_u8()?;
        if min_precontext > max_precontext {
            return Err(ParseError::BadValue);
        }
        let start_states =
            ctxt.read_u16s(usize::from(max_precontext - min_precontext) + 1)?;
        if num_rows > 0 && start_states.iter().any(|&state| state >= num_rows) {
            return Err(ParseError::BadValue);
        }

        let sort_keys = ctxt.read_u16s(usize::from(num_rules))?;
        let precontexts = ctxt.read_slice(usize::from(num_rules))?.to_vec();

        let pass_constraint_len = ctxt.read_u16be()?;

        let constraint_offsets: Vec<usize> = ctxt
            .read_u16s(usize::from(num_rules) + 1)?
            .into_iter()
            .map(usize::from)
            .collect();
        let action_offsets: Vec<usize> = ctxt
            .read_u16s(usize::from(num_rules) + 1)?
            .into_iter()
            .map(usize::from)
            .collect();
        if constraint_offsets.windows(2).any(|w| w[0] > w[1])
            || action_offsets.windows(2).any(|w| w[0] > w[1])
        {
            return Err(ParseError::BadOffset);
        }

        let transition_count = usize::from(num_transitional) * usize::from(num_columns);
        let transitions = ctxt.read_u16s(transition_count)?;
        if transitions.iter().any(|&state| state >= num_rows) {
            return Err(ParseError::BadValue);
        }

        let pass_constraint_bytes = ctxt.read_slice(usize::from(pass_constraint_len))?;
        let constraint_bytes = ctxt.read_slice(*constraint_offsets.last().unwrap())?;
        let action_bytes = ctxt.read_slice(*action_offsets.last().unwrap())?;

        // Load the byte code. A program that fails validation disables the
        // whole pass; the face remains usable.
        let mut disabled = None;
        let mut load = |constraint: bool, bytes: &[u8]| -> Option<Code> {
            if bytes.is_empty() || disabled.is_some() {
                return None;
            }
            match Code::new(constraint, bytes) {
                Ok(code) => Some(code),
                Err(err) => {
                    warn!("disabling pass: rule program failed to load: {}", err);
                    disabled = Some(err);
                    None
                }
            }
        };

        let pass_constraint = load(true, pass_constraint_bytes);
        let mut rules = Vec::with_capacity(usize::from(num_rules));
        for i in 0..usize::from(num_rules) {
            let constraint =
                load(true, &constraint_bytes[constraint_offsets[i]..constraint_offsets[i + 1]]);
            let action = load(false, &action_bytes[action_offsets[i]..action_offsets[i + 1]]);
            rules.push(Rule {
                sort_key: sort_keys[i],
                precontext: precontexts[i],
                constraint,
                action,
            });
        }

        Ok(Pass {
            flags,
            max_rule_loop,
            max_backup,
            rules,
            num_rows,
            num_transitional,
            num_success,
            num_columns,
            ranges,
            transitions,
            rule_map_offsets,
            rule_map,
            min_precontext,
            max_precontext,
            start_states,
            pass_constraint,
            disabled,
        })
    }
}

impl Pass {
    pub fn disabled(&self) -> Option<CodeError> {
        self.disabled
    }

    pub fn num_rules(&self) -> usize {
        self.rules.len()
    }

    /// Map a glyph to its transition column for this pass.
    fn column_of(&self, glyph: GlyphId) -> Option<u16> {
        let index = self.ranges.partition_point(|r| r.last < glyph);
        let range = self.ranges.get(index)?;
        (range.first <= glyph).then_some(range.column)
    }

    /// Walk the slot stream from `start`, filling `map` with the precontext
    /// and matched slots, and return candidate rule ids in firing order.
    fn run_fsm(&self, seg: &Segment, start: SlotRef, map: &mut SlotMap) -> Vec<u16> {
        let mut precontext = Vec::new();
        let mut cursor = seg.prev(start);
        while precontext.len() < usize::from(self.max_precontext) {
            match cursor {
                Some(slot) => {
                    precontext.push(slot);
                    cursor = seg.prev(slot);
                }
                None => break,
            }
        }
        if precontext.len() < usize::from(self.min_precontext) {
            return Vec::new();
        }
        for &slot in precontext.iter().rev() {
            map.push(slot);
        }
        map.set_precontext(map.len());

        let mut state = self.start_states[usize::from(self.max_precontext) - map.len()];
        let success_start = self.num_rows - self.num_success;
        let mut candidates: Vec<u16> = Vec::new();

        let mut cursor = Some(start);
        while let Some(slot_ref) = cursor {
            if !map.push(slot_ref) {
                break;
            }
            let glyph = match seg.slot(slot_ref) {
                Some(slot) => slot.glyph_id(),
                None => break,
            };
            let column = match self.column_of(glyph) {
                Some(column) => column,
                None => break,
            };
            if state >= self.num_transitional {
                break;
            }
            let index = usize::from(state) * usize::from(self.num_columns) + usize::from(column);
            state = self.transitions[index];
            if state == 0 {
                break;
            }
            if state >= success_start {
                let success = usize::from(state - success_start);
                let from = usize::from(self.rule_map_offsets[success]);
                let to = usize::from(self.rule_map_offsets[success + 1]);
                candidates.extend_from_slice(&self.rule_map[from..to]);
            }
            cursor = seg.next(slot_ref);
        }

        candidates.sort_by_key(|&id| {
            let rule = &self.rules[usize::from(id)];
            (std::cmp::Reverse(rule.sort_key), id)
        });
        candidates.dedup();
        candidates
    }

    /// Evaluate a rule's constraint over each slot of its context.
    fn test_constraint<G: GlyphSource>(
        &self,
        rule: &Rule,
        seg: &mut Segment,
        machine: &mut Machine,
        ctx: &RunContext<'_, G>,
        map: &mut SlotMap,
    ) -> Result<bool, MachineStatus> {
        let context = map.precontext();
        if usize::from(rule.precontext) > context {
            return Ok(false);
        }
        let rule_start = context - usize::from(rule.precontext);
        let length = usize::from(rule.sort_key);
        if rule_start + length > map.len() {
            return Ok(false);
        }
        let constraint = match &rule.constraint {
            Some(constraint) => constraint,
            None => return Ok(true),
        };

        for n in 0..length {
            let mut is = rule_start + n;
            if map.get(is).is_none() {
                continue;
            }
            let ret = machine.run(constraint, seg, ctx, map, rule_start, &mut is);
            match machine.status() {
                MachineStatus::Finished => {}
                status => return Err(status),
            }
            if ret == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Run a rule's action and compute where matching resumes.
    fn do_action<G: GlyphSource>(
        &self,
        rule: &Rule,
        seg: &mut Segment,
        machine: &mut Machine,
        ctx: &RunContext<'_, G>,
        map: &mut SlotMap,
    ) -> Result<Option<SlotRef>, MachineStatus> {
        let context = map.precontext();
        let rule_start = context.saturating_sub(usize::from(rule.precontext));
        let anchor_prev = map.get(0).and_then(|slot| seg.prev(slot));
        // The map still holds the matcher's look-ahead; the rule owns only
        // its own context, and matching resumes right after it.
        map.truncate(context + usize::from(rule.sort_key) - usize::from(rule.precontext));

        let ret = match &rule.action {
            Some(action) => {
                let mut is = rule_start;
                let ret = machine.run(action, seg, ctx, map, rule_start, &mut is);
                match machine.status() {
                    MachineStatus::Finished => ret,
                    status => return Err(status),
                }
            }
            None => 0,
        };

        // Resume after the matched window, then apply the action's cursor
        // adjustment: negative backs up (bounded), positive skips ahead.
        let mut cursor = match map.last_live() {
            Some(last) => seg.next(last),
            None => match anchor_prev {
                Some(prev) => seg.next(prev),
                None => seg.first_slot(),
            },
        };
        if ret < 0 {
            let steps = ret.unsigned_abs().min(u32::from(self.max_backup));
            for _ in 0..steps {
                cursor = match cursor {
                    Some(slot) => seg.prev(slot),
                    None => seg.last_slot(),
                };
            }
        } else {
            for _ in 0..ret {
                cursor = match cursor {
                    Some(slot) => seg.next(slot),
                    None => break,
                };
            }
        }
        Ok(cursor)
    }

    /// Apply this pass over the whole segment.
    pub(crate) fn run<G: GlyphSource>(
        &self,
        seg: &mut Segment,
        machine: &mut Machine,
        ctx: &RunContext<'_, G>,
    ) {
        if let Some(err) = self.disabled {
            warn!("skipping disabled pass: {}", err);
            return;
        }

        if let Some(pass_constraint) = &self.pass_constraint {
            let mut map = SlotMap::new();
            if let Some(first) = seg.first_slot() {
                map.push(first);
            }
            let mut is = 0;
            let ret = machine.run(pass_constraint, seg, ctx, &mut map, 0, &mut is);
            match machine.status() {
                MachineStatus::Finished => {}
                status => {
                    seg.record_failure(status);
                    return;
                }
            }
            if ret == 0 {
                return;
            }
        }

        if self.rules.is_empty() || self.num_rows == 0 {
            return;
        }

        let mut cursor = seg.first_slot();
        let mut loop_count: u8 = 0;
        let max_loop = self.max_rule_loop.max(1);
        // Backstop against rules that oscillate the cursor without
        // converging; forward motion normally ends the pass long before.
        let mut fire_budget = (seg.n_slots() + 2) * usize::from(max_loop);

        while let Some(slot) = cursor {
            let mut map = SlotMap::new();
            let candidates = self.run_fsm(seg, slot, &mut map);

            let mut next_cursor = None;
            let mut fired = false;
            for id in candidates {
                let rule = &self.rules[usize::from(id)];
                match self.test_constraint(rule, seg, machine, ctx, &mut map) {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(status) => {
                        seg.record_failure(status);
                        return;
                    }
                }
                match self.do_action(rule, seg, machine, ctx, &mut map) {
                    Ok(cursor) => {
                        crate::trace::rule_fired(id, seg.n_slots());
                        next_cursor = cursor;
                        fired = true;
                    }
                    Err(status) => {
                        seg.record_failure(status);
                        return;
                    }
                }
                break;
            }

            if !fired {
                cursor = seg.next(slot);
                loop_count = 0;
                continue;
            }

            fire_budget = match fire_budget.checked_sub(1) {
                Some(remaining) => remaining,
                None => return,
            };
            if next_cursor == Some(slot) {
                loop_count += 1;
                if loop_count >= max_loop {
                    cursor = seg.next(slot);
                    loop_count = 0;
                    continue;
                }
            } else {
                loop_count = 0;
            }
            cursor = next_cursor;
        }
    }
}
