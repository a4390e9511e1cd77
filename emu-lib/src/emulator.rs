use std::sync::Arc;

use common::opcode::{self, Opcode, GROUP3_BIT, INDIRECT_BIT, PAGE_BIT};
use common::word::{self, OFFSET_MASK, WORD_MASK};

use log::{debug, trace};

use crate::io::console::{Console, StdConsole};
use crate::io::lpt::Lpt;
use crate::io::rx8e::Rx8e;
use crate::io::tc08::Tc08;
use crate::io::IotHandler;
use crate::{EmuError, EmulatorState, Registers};

/// The processor: registers and core plus optional peripheral controllers.
/// The console is always present; the keyboard and teleprinter IOTs talk to
/// it directly.
pub struct Emulator {
    state: EmulatorState,
    console: Arc<dyn Console>,
    lpt: Option<Lpt>,
    tc08: Option<Tc08>,
    rx8e: Option<Rx8e>,
}

impl Emulator {
    // Keyboard/teleprinter IOTs.
    pub const KCF: u16 = 0o6031;
    pub const KSF: u16 = 0o6032;
    pub const KRS: u16 = 0o6034;
    pub const KRB: u16 = 0o6036;
    pub const TCF: u16 = 0o6041;
    pub const TSF: u16 = 0o6042;
    pub const TLS: u16 = 0o6044;
    pub const TLSC: u16 = 0o6046;

    // Line printer IOTs.
    pub const LPCF: u16 = 0o6601;
    pub const LPSF: u16 = 0o6602;
    pub const LPT: u16 = 0o6604;
    pub const LPTC: u16 = 0o6606;

    pub fn new() -> Emulator {
        Self::with_console(Arc::new(StdConsole::new()))
    }

    pub fn with_console(console: Arc<dyn Console>) -> Emulator {
        Emulator {
            state: EmulatorState::new(),
            console,
            lpt: None,
            tc08: None,
            rx8e: None,
        }
    }

    /// Zero memory and registers and clear controller state. Attachments
    /// survive.
    pub fn reset(&mut self) {
        self.state.reset();
        if let Some(rx8e) = &mut self.rx8e {
            rx8e.reset();
        }
        if let Some(tc08) = &mut self.tc08 {
            tc08.reset();
        }
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.state.set_pc(pc);
    }

    pub fn clear_halt(&mut self) {
        self.state.clear_halt();
    }

    pub fn read(&self, addr: u32) -> Result<u16, EmuError> {
        self.state.read(addr)
    }

    pub fn write(&mut self, addr: u32, val: u16) -> Result<(), EmuError> {
        self.state.write(addr, val)
    }

    pub fn registers(&self) -> Registers {
        self.state.registers()
    }

    pub fn state(&self) -> &EmulatorState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut EmulatorState {
        &mut self.state
    }

    pub fn load_words(&mut self, words: impl IntoIterator<Item = (u16, u16)>) {
        for (addr, val) in words {
            self.state.mem_write(addr, val);
        }
    }

    pub fn set_lpt(&mut self, lpt: Lpt) {
        self.lpt = Some(lpt);
    }

    pub fn lpt(&self) -> Option<&Lpt> {
        self.lpt.as_ref()
    }

    pub fn set_tc08(&mut self, tc08: Tc08) {
        self.tc08 = Some(tc08);
    }

    pub fn tc08_mut(&mut self) -> Option<&mut Tc08> {
        self.tc08.as_mut()
    }

    pub fn set_rx8e(&mut self, rx8e: Rx8e) {
        self.rx8e = Some(rx8e);
    }

    pub fn rx8e_mut(&mut self) -> Option<&mut Rx8e> {
        self.rx8e.as_mut()
    }

    pub fn console(&self) -> &Arc<dyn Console> {
        &self.console
    }

    ///////////////////////////////////////////////////////////////////////////

    /// Execute one instruction. Returns the number of instructions executed:
    /// zero when halted, one otherwise.
    pub fn step(&mut self) -> usize {
        if self.state.halted() {
            return 0;
        }

        let ir = self.state.mem_read(self.state.pc());
        trace!("PC {:04o}: IR {ir:04o}", self.state.pc());
        self.state.set_ir(ir);
        self.state.set_pc(word::inc(self.state.pc()));

        match Opcode::from_word(ir) {
            Opcode::Iot => self.exec_iot(ir),
            Opcode::Opr => self.exec_operate(ir),
            _ => self.exec_mem_ref(ir),
        }

        self.state.inc_steps();
        1
    }

    /// Run until HALT or the step budget is spent. Returns the number of
    /// instructions executed.
    pub fn run(&mut self, max_steps: usize) -> usize {
        let mut steps = 0;
        while steps < max_steps {
            if self.step() == 0 {
                break;
            }
            steps += 1;
        }
        debug!("Run stopped after {steps} steps at PC {:04o}", self.state.pc());
        steps
    }

    ///////////////////////////////////////////////////////////////////////////

    // Indirection through page zero's auto-index locations pre-increments
    // the pointer, once per reference.
    fn effective_address(&mut self, ir: u16) -> u16 {
        let current_page = ir & PAGE_BIT != 0;
        let base = if current_page {
            word::page_of(self.state.pc())
        } else {
            0
        };
        let ea = base | (ir & OFFSET_MASK);

        if ir & INDIRECT_BIT == 0 {
            return ea;
        }
        if !current_page && word::is_auto_index(ea) {
            let val = word::inc(self.state.mem_read(ea));
            self.state.mem_write(ea, val);
        }
        self.state.mem_read(ea)
    }

    fn exec_mem_ref(&mut self, ir: u16) {
        let op = Opcode::from_word(ir);
        let ea = self.effective_address(ir);
        match op {
            Opcode::And => self.state.set_ac(self.state.ac() & self.state.mem_read(ea)),
            Opcode::Tad => {
                let sum = self.state.ac() as u32 + self.state.mem_read(ea) as u32;
                if sum > WORD_MASK as u32 {
                    self.state.set_link(!self.state.link());
                }
                self.state.set_ac(word::wrap(sum));
            }
            Opcode::Isz => {
                let val = word::inc(self.state.mem_read(ea));
                self.state.mem_write(ea, val);
                if val == 0 {
                    self.state.skip();
                }
            }
            Opcode::Dca => {
                self.state.mem_write(ea, self.state.ac());
                self.state.set_ac(0);
            }
            Opcode::Jms => {
                // The return address lands in the entry word.
                self.state.mem_write(ea, self.state.pc());
                self.state.set_pc(word::inc(ea));
            }
            Opcode::Jmp => self.state.set_pc(ea),
            Opcode::Iot | Opcode::Opr => unreachable!(),
        }
    }

    ///////////////////////////////////////////////////////////////////////////

    fn exec_iot(&mut self, ir: u16) {
        match ir {
            Self::KCF | Self::TCF | Self::LPCF => (),
            Self::KSF => {
                if self.console.key_available() {
                    self.state.skip();
                }
            }
            Self::KRS | Self::KRB => {
                let key = self.console.read_key().unwrap_or(0);
                self.state
                    .set_ac((self.state.ac() & 0o7400) | key as u16);
            }
            // Output is always ready.
            Self::TSF | Self::LPSF => self.state.skip(),
            Self::TLS | Self::TLSC => self.console.write_char((self.state.ac() & 0xff) as u8),
            Self::LPT | Self::LPTC => {
                if let Some(lpt) = &mut self.lpt {
                    lpt.print((self.state.ac() & 0xff) as u8);
                }
            }
            Rx8e::LCD..=Rx8e::INIT => {
                if let Some(rx8e) = &mut self.rx8e {
                    rx8e.handle_iot(ir, &mut self.state);
                }
            }
            Tc08::DTCA | Tc08::DTSF | Tc08::DTLB | Tc08::DTXA => {
                if let Some(tc08) = &mut self.tc08 {
                    tc08.handle_iot(ir, &mut self.state);
                }
            }
            _ => trace!("IOT {ir:04o} ignored"),
        }
    }

    /// Front-panel switch register, read by OSR. There is no panel; it
    /// always reads zero.
    fn switch_register(&self) -> u16 {
        0
    }

    ///////////////////////////////////////////////////////////////////////////

    fn exec_operate(&mut self, ir: u16) {
        if ir & 0o400 == 0 {
            self.operate_group1(ir);
        } else if ir & GROUP3_BIT == 0 {
            self.operate_group2(ir);
        } else {
            self.operate_group3(ir);
        }
    }

    fn operate_group1(&mut self, ir: u16) {
        use opcode::group1::*;

        let mut ac = self.state.ac();
        let mut link = self.state.link();

        if ir & CLA != 0 {
            ac = 0;
        }
        if ir & CLL != 0 {
            link = false;
        }
        if ir & CMA != 0 {
            ac = !ac & WORD_MASK;
        }
        if ir & CML != 0 {
            link = !link;
        }

        // BSW alone swaps the 6-bit halves; combined with a rotate it turns
        // the rotate into a double rotate.
        let times = if ir & BSW != 0 && ir & (RAR | RAL) != 0 {
            2
        } else {
            1
        };
        if ir & RAR != 0 {
            for _ in 0..times {
                (link, ac) = word::rotate_right(link, ac);
            }
        } else if ir & RAL != 0 {
            for _ in 0..times {
                (link, ac) = word::rotate_left(link, ac);
            }
        } else if ir & BSW != 0 {
            ac = word::byte_swap(ac);
        }

        if ir & IAC != 0 {
            if ac == WORD_MASK {
                link = !link;
            }
            ac = word::inc(ac);
        }

        self.state.set_ac(ac);
        self.state.set_link(link);
    }

    // The skip is the plain OR of the conditions; there is no reverse-sense
    // bit in this machine's decode.
    fn operate_group2(&mut self, ir: u16) {
        use opcode::group2::*;

        let ac = self.state.ac();
        let skip = (ir & SMA != 0 && ac & 0o4000 != 0)
            || (ir & SZA != 0 && ac == 0)
            || (ir & SNL != 0 && self.state.link());
        if skip {
            self.state.skip();
        }

        if ir & CLA != 0 {
            self.state.set_ac(0);
        }
        if ir & OSR != 0 {
            self.state.set_ac(self.state.ac() | self.switch_register());
        }
        if ir & HLT != 0 {
            debug!("HLT at {:04o}", self.state.pc());
            self.state.set_halt(true);
        }
    }

    fn operate_group3(&mut self, ir: u16) {
        use opcode::group3::*;

        if ir & CLA != 0 {
            self.state.set_ac(0);
        }
        if ir & MQA != 0 {
            self.state.set_ac(self.state.ac() | self.state.mq());
        }
        if ir & MQL != 0 {
            self.state.set_mq(self.state.ac());
            self.state.set_ac(0);
        }
    }
}

impl Default for Emulator {
    fn default() -> Self {
        Self::new()
    }
}
